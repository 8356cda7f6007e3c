mod format_bytes;
pub use format_bytes::format_bytes;

mod parse_quantity;
pub use parse_quantity::parse_quantity;

mod verify_file_existence;
pub use verify_file_existence::verify_file_existence;
