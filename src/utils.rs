pub mod hex_ext;
pub mod smart_to_string;
pub mod stream_pipeline;
