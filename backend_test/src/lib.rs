use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// [`crate::store::Store`]. Both are backed by the same fresh store, so data
/// inserted through one is visible through the other. The store is in-memory
/// unless `EVOTE_TEST_DB_URI` names a MongoDB replica set, in which case each
/// test gets its own randomly named database, dropped afterwards.
#[proc_macro_attribute]
pub fn backend_test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the parameters to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn __backend_test_setup() -> (
                rocket::local::asynchronous::Client,
                crate::store::Store,
                Option<mongodb::Database>,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(
                    ["evote_backend"],
                    None,
                    None,
                );

                let (store, db) = crate::store::testing::test_store().await;
                let notifier: crate::notify::SharedNotifier =
                    std::sync::Arc::new(crate::notify::LogNotifier);
                let rocket = crate::rocket_for_store_and_notifier(
                    crate::Config::example(),
                    store.clone(),
                    notifier,
                );
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();

                (rocket_client, store, db)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn __backend_test_cleanup(db: Option<mongodb::Database>) {
                if let Some(db) = db {
                    db.drop(None).await.unwrap();
                }
            }

            // Several workers, so that tests can exercise genuinely concurrent tasks.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("backend-test-worker")
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            let (__rocket_client, __store, __db) = runtime.block_on(__backend_test_setup());

            // Run the test, catching any panics so the database is always dropped.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let _ = (&__rocket_client, &__store);
                runtime.block_on(#new_name(#(#test_args),*));
            }));

            runtime.block_on(__backend_test_cleanup(__db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_store = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself.
                    let type_ident = &type_path.path.segments.last().unwrap().ident;
                    if type_ident == "Client" {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { __rocket_client });
                        continue;
                    } else if type_ident == "Store" {
                        if has_store {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Store`",
                            ));
                        }
                        has_store = true;
                        args.push(quote! { __store.clone() });
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `store_ident: Store`",
        ));
    }

    Ok(args)
}
