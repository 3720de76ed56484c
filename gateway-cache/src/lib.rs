pub mod fingerprint;
pub mod store;

pub use fingerprint::{canonicalize_params, params_fingerprint, prompt_hash, prompt_hash_extract, redis_key, CacheKind};
pub use store::{CacheLayer, CacheProtocol, CacheReadResult, KvStore, RowStore};
