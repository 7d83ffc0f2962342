pub mod csv_loader;

pub use csv_loader::{load_peg_definitions_from_csv, FamilyFilter, LoadedFilters};
