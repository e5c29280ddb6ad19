pub mod decode;
pub mod stream;
pub mod window;
