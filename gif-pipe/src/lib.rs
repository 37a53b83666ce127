pub mod encoder;
pub mod error;
pub mod fetch;
pub mod frame;
pub mod pipe;
pub mod url;
pub mod viewpoint;
