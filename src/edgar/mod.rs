pub mod accession;
pub mod csv;
pub mod info_table;
pub mod locate;
pub mod types;
