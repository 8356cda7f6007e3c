use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the map file (or validate an existing one)
    Create {
        /// Number of counters the map must hold (default: 1m)
        #[arg(short = 'n', long = "entries", value_name = "COUNT")]
        entries: Option<String>,

        /// Number of independently locked segments (default: 128)
        #[arg(short = 's', long = "segments", value_name = "COUNT")]
        segments: Option<String>,

        /// Per-entry byte budget for key plus 8-byte counter (default: 128)
        #[arg(short = 'e', long = "entry-size", value_name = "BYTES")]
        entry_size: Option<String>,
    },

    /// Print the counter stored under a key
    Get {
        /// The key to read
        key: String,
    },

    /// Atomically add to a counter, creating it at zero if missing
    Incr {
        /// The key to increment
        key: String,

        /// Amount to add (may be negative)
        #[arg(short = 'd', long = "delta", default_value_t = 1, allow_negative_numbers = true)]
        delta: i64,

        /// Apply the increment this many times
        #[arg(short = 'r', long = "repeat", default_value_t = 1)]
        repeat: u64,
    },

    /// Overwrite a counter, creating it if missing
    Set {
        /// The key to write
        key: String,

        /// The new value
        #[arg(allow_negative_numbers = true)]
        value: i64,
    },

    /// Delete a key
    Remove {
        /// The key to delete
        key: String,
    },

    /// Print every key and counter
    List,

    /// Get current state of the map file
    Info,
}
