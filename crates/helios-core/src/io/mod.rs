pub mod file_form;
pub mod fits;
pub mod raw;
