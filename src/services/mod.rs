pub mod automation_service;
pub mod credential_store;
pub mod login_script;
pub mod qr_service;
pub mod webdriver;
