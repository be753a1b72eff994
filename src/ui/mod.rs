pub mod render;
pub mod request_form;
pub mod request_list;
pub mod status;
