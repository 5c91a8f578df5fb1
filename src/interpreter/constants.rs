// Constants for the memory simulator

/// Addresses below this value are never mapped, so address 0 is always null
/// and small offsets from null never alias a real allocation.
pub const NULL_GUARD: u64 = 0x1000;

/// Size in bytes of a pointer stored in simulated memory.
pub const POINTER_SIZE: usize = 8;

/// Widest integer that can be read or written through a pointer.
pub const MAX_SCALAR_SIZE: usize = 8;

/// Name of the frame that exists before the first instruction runs.
pub const ROOT_FUNCTION: &str = "main";

/// Default stack region size (64 KiB)
pub const DEFAULT_STACK_CAPACITY: usize = 64 * 1024;

/// Default heap region size (1 MiB)
pub const DEFAULT_HEAP_CAPACITY: usize = 1024 * 1024;

/// Largest combined heap and stack size a configuration may request (1 GiB)
pub const MAX_ADDRESS_SPACE: usize = 1024 * 1024 * 1024;

/// Default memory budget for the snapshot history (64 MiB)
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 64 * 1024 * 1024;
