pub mod automation_dto;
pub mod scan_dto;
pub mod user_dto;
