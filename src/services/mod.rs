/**
 * Services Module
 * External collaborators: asset storage and outbound mail
 */
pub mod assets;
pub mod mailer;

pub use assets::{AssetStorage, DynAssets, StoredAsset, UploadFile};
pub use mailer::{Email, Mailer};
