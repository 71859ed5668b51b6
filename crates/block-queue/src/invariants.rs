//! Debug assertion macros for the queue's invariants (spec §3, §8).
//!
//! Zero overhead in release builds (`#[cfg(debug_assertions)]`); these exist
//! to catch a broken invariant at the point it first becomes observable
//! rather than downstream, in whatever test or caller next trips over it.

/// INV-Q-01: count equals both index sizes.
///
/// **Invariant**: `count == |height_index| == |hash_index|`
macro_rules! debug_assert_index_consistency {
    ($count:expr, $height_index_len:expr, $hash_index_len:expr) => {
        debug_assert!(
            $count == $height_index_len && $count == $hash_index_len,
            "INV-Q-01 violated: count={} height_index={} hash_index={}",
            $count,
            $height_index_len,
            $hash_index_len
        )
    };
}

/// INV-Q-02: consecutive FIFO heights.
///
/// **Invariant**: `block_{k+1}.height == block_k.height + 1`
macro_rules! debug_assert_consecutive_heights {
    ($prev_height:expr, $next_height:expr) => {
        debug_assert!(
            $next_height == $prev_height + 1,
            "INV-Q-02 violated: prev height {} followed by {}",
            $prev_height,
            $next_height
        )
    };
}

/// INV-Q-03: byte budget never exceeded after a successful enqueue.
///
/// **Invariant**: `current_bytes <= max_queue_bytes`
macro_rules! debug_assert_within_byte_budget {
    ($current_bytes:expr, $max_bytes:expr) => {
        debug_assert!(
            $current_bytes <= $max_bytes,
            "INV-Q-03 violated: current_bytes {} exceeds max_bytes {}",
            $current_bytes,
            $max_bytes
        )
    };
}

/// INV-Q-04: occupancy never exceeds ring length.
///
/// **Invariant**: `count <= length`
macro_rules! debug_assert_bounded_occupancy {
    ($count:expr, $length:expr) => {
        debug_assert!(
            $count <= $length,
            "INV-Q-04 violated: count {} exceeds ring length {}",
            $count,
            $length
        )
    };
}

/// INV-P-01: planner EMA stays within its configured clamp.
///
/// **Invariant**: `min_avg_bytes <= ema <= max_avg_bytes`
macro_rules! debug_assert_ema_clamped {
    ($ema:expr, $min:expr, $max:expr) => {
        debug_assert!(
            $ema >= $min && $ema <= $max,
            "INV-P-01 violated: ema {} outside [{}, {}]",
            $ema,
            $min,
            $max
        )
    };
}

/// INV-Q-05: a resize never shrinks below current occupancy.
///
/// **Invariant**: `new_capacity >= count`
macro_rules! debug_assert_resize_preserves_occupancy {
    ($new_capacity:expr, $count:expr) => {
        debug_assert!(
            $new_capacity >= $count,
            "INV-Q-05 violated: resize target {} is below occupancy {}",
            $new_capacity,
            $count
        )
    };
}

pub(crate) use debug_assert_bounded_occupancy;
pub(crate) use debug_assert_consecutive_heights;
pub(crate) use debug_assert_ema_clamped;
pub(crate) use debug_assert_index_consistency;
pub(crate) use debug_assert_resize_preserves_occupancy;
pub(crate) use debug_assert_within_byte_budget;
