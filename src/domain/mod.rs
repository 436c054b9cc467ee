pub mod case_meta;
pub mod form_data;
