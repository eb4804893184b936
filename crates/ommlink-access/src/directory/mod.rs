// ── Directory caching and merge logic ──
//
// Shared by the provider (source-of-truth store for advertised services)
// and the consumer (network-fed cache behind directory subscriptions).

mod cache;
mod store;

pub(crate) use cache::DirectoryCache;
pub(crate) use store::{
    DirectoryServiceStore, DirectoryStoreListener, StoreRole, apply_directory_service,
    encode_pooled_services,
};
