pub mod client;
pub mod image;
pub mod types;

pub use client::GeminiHttpClient;
pub use image::GeminiRemixClient;
