pub mod catalog;
pub mod employee;
pub mod history;
pub mod request;
