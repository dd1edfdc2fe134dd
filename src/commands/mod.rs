pub mod run;
pub mod status;
pub mod validate;
pub mod watermark;
