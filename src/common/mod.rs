pub mod rendition;
pub mod response;
pub mod upload;
