use proc_macro::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{parse_macro_input, ItemFn, ReturnType};

/// Test case procedural macro for the sync layer.
///
/// Turns a plain `fn()` into a `#[test]` that:
/// - installs the colored logger, so `LOG=DEBUG` shows lock traffic
/// - prints a `Testing > name (file)` header and a pass line
/// - keeps every other attribute (`#[should_panic]`, `#[cfg(..)]`, ...)
///
/// The body runs in an inner function so an early `return` still reaches the
/// pass line only on success.
#[proc_macro_attribute]
pub fn sync_test(attr: TokenStream, input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);

    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[sync_test] takes no arguments",
        )
        .to_compile_error()
        .into();
    }
    if !input_fn.sig.inputs.is_empty() {
        return syn::Error::new(input_fn.sig.inputs.span(), "test functions take no parameters")
            .to_compile_error()
            .into();
    }
    if let ReturnType::Type(_, ty) = &input_fn.sig.output {
        return syn::Error::new(ty.span(), "test functions must return ()")
            .to_compile_error()
            .into();
    }

    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let fn_name = &input_fn.sig.ident;
    let body = &input_fn.block;

    let output = quote! {
        #[test]
        #(#attrs)*
        #vis fn #fn_name() {
            fn __sync_test_body() #body

            ::xux_arbiter::testing::banner(stringify!(#fn_name), file!());
            __sync_test_body();
            ::xux_arbiter::testing::passed();
        }
    };

    output.into()
}
