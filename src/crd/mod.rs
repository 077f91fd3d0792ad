pub mod inference_service;
pub mod virtual_service;
