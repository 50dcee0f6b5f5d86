mod binary;
mod traits;

pub use crate::binary::slice_binary;
pub use crate::traits::{AssetError, AssetFS, MemoryAssetFS, PathType, StdAssetFS};
