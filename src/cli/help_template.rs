use indoc::indoc;

// Help text template with placeholder
pub const HELP_TEMPLATE: &str = indoc! {r#"
    Examples:
      # Creating a map for one million counters
      %BINARY_NAME% /dev/shm/hits.shm create --entries 1m --segments 128 --entry-size 24

      # Incrementing a counter (safe from many processes at once)
      %BINARY_NAME% /dev/shm/hits.shm incr page:/index

      # Decrementing a counter
      %BINARY_NAME% /dev/shm/hits.shm incr page:/index --delta -1

      # Reading a counter
      %BINARY_NAME% /dev/shm/hits.shm get page:/index

      # Overwriting a counter
      %BINARY_NAME% /dev/shm/hits.shm set page:/index 0

      # Deleting a key
      %BINARY_NAME% /dev/shm/hits.shm remove page:/index

      # Listing all counters
      %BINARY_NAME% /dev/shm/hits.shm list

      # Displaying map file info
      %BINARY_NAME% /dev/shm/hits.shm info
"#};
