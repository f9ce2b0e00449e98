pub mod auth;
pub mod client_info;

/// Builds the per-router tower stack. `u` adds the identity-extraction
/// middleware for routes that require an authenticated caller.
#[macro_export]
macro_rules! filecore_layer_builder {
    ($(,)?) => {
        || {
            tower::ServiceBuilder::new().layer($crate::layers::client_info::ClientInfoLayer::new())
        }
    };
    (u $(,)?) => {
        || {
            tower::ServiceBuilder::new()
                .layer($crate::layers::client_info::ClientInfoLayer::new())
                .layer(axum::middleware::from_fn($crate::layers::auth::identity_checker))
        }
    };
}
