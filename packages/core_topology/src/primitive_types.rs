/// Identifies a specific logical processor (a hardware thread).
///
/// This is the same numbering the operating system uses: on Linux it is the `N` in
/// `/sys/devices/system/cpu/cpuN`, on Windows it is the bit index in a processor group mask.
pub type ProcessorId = u32;

/// Index of a physical core in the order reported by [`Topology`][crate::Topology].
///
/// Physical cores are ordered by the lowest logical processor they contain, so core 0 is the
/// core that contains the lowest numbered logical processor.
pub type CoreIndex = usize;
