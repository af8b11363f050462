// Basic entity mappings on database tables
// (should be mostly 1:1 copies of our schema and helpers).
pub mod asset_row;
pub use self::asset_row::AssetRow;
