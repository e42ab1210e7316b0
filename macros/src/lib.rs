use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, parse_quote, spanned::Spanned, Ident, ItemFn, LitStr};

/// Test attribute for marble tests.
///
/// Expands to `#[test]` natively and `wasm_bindgen_test` on wasm32. Marble
/// runs are synchronous, so `async fn` tests are rejected.
///
/// `#[rxrust_marbles_macro::test(trace)]` additionally installs a
/// `tracing-subscriber` fmt layer honoring `RUST_LOG`, writing through the
/// test harness capture.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
  let mut input = parse_macro_input!(item as ItemFn);

  if let Some(asyncness) = input.sig.asyncness {
    return TokenStream::from(
      syn::Error::new(
        asyncness.span(),
        "rxrust_marbles_macro::test runs on virtual time and does not accept async functions. \
         Drive futures with `TestScheduler::spawn` instead.",
      )
      .to_compile_error(),
    );
  }

  let raw_args = proc_macro2::TokenStream::from(attr);
  let trace = if raw_args.is_empty() {
    false
  } else if let Ok(ident) = syn::parse2::<Ident>(raw_args.clone()) {
    match ident.to_string().as_str() {
      "trace" => true,
      _ => return unknown_flavor(ident.span()),
    }
  } else if let Ok(lit) = syn::parse2::<LitStr>(raw_args.clone()) {
    match lit.value().as_str() {
      "trace" => true,
      _ => return unknown_flavor(lit.span()),
    }
  } else {
    return unknown_flavor(raw_args.span());
  };

  if trace {
    input.block.stmts.insert(
      0,
      parse_quote! {
        let _ = ::tracing_subscriber::fmt()
          .with_env_filter(::tracing_subscriber::EnvFilter::from_default_env())
          .with_test_writer()
          .without_time()
          .try_init();
      },
    );
  }

  let expanded = quote! {
      #[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
      #[cfg_attr(not(target_arch = "wasm32"), test)]
      #input
  };

  TokenStream::from(expanded)
}

fn unknown_flavor(span: proc_macro2::Span) -> TokenStream {
  TokenStream::from(
    syn::Error::new(
      span,
      "rxrust_marbles_macro::test only accepts: #[rxrust_marbles_macro::test] or \
       #[rxrust_marbles_macro::test(trace)]",
    )
    .to_compile_error(),
  )
}
