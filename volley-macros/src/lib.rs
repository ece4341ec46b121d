use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{ItemFn, LitStr};

/// Proc macro to denote a Transaction
///
/// Wraps the body of an `async fn` returning `Result<T, E>` so that every call is timed and
/// recorded into the running load test's `req_duration` and `req_failed` metrics, along with a
/// `req_duration{<name>}` sub-metric. The name defaults to the function's name and can be
/// overridden with a string argument.
///
/// # Example
/// ```ignore
/// use volley::prelude::*;
///
/// #[transaction]
/// async fn get_health(client: &reqwest::Client) -> Result<String, reqwest::Error> {
///     ...
/// }
///
/// #[transaction("create user")]
/// async fn create_user(client: &reqwest::Client) -> Result<(), reqwest::Error> {
///     ...
/// }
/// ```
#[proc_macro_attribute]
pub fn transaction(attr: TokenStream, item: TokenStream) -> TokenStream {
    transaction_internal(attr, item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn transaction_internal(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream2> {
    let input = syn::parse::<ItemFn>(item)?;

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let stmts = &block.stmts;

    if sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            sig.fn_token,
            "#[transaction] can only be applied to async functions",
        ));
    }

    let name = if attr.is_empty() {
        sig.ident.to_string()
    } else {
        syn::parse::<LitStr>(attr)?.value()
    };

    Ok(quote! {
        #(#attrs)* #vis #sig {
            ::volley::transaction::transaction_hook(#name, async move {
                #(#stmts)*
            }).await
        }
    })
}
