//! Property-based tests for the scheduler.

mod alloc_props;
mod axis_merge_props;
mod cast_props;
