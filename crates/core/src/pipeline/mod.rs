pub mod annotate_stream_use_case;
pub mod pipeline_config;
pub mod pipeline_logger;
