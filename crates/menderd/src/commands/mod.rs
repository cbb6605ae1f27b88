pub mod backups;
pub mod fix;
pub mod providers;
pub mod restore;
