//! Stack discipline of contextual values, including across threads

use foldscope::context::{ContextManager, ContextSnapshot, ContextualValue, ScopedGuard};
use once_cell::sync::Lazy;
use proptest::prelude::*;

static DEPTH_LIMIT: Lazy<ContextualValue<i64>> =
    Lazy::new(|| ContextualValue::new("context_scoping", "depth_limit", -1));

/// Held guards, released innermost first even when an assertion returns early.
struct GuardStack(Vec<ScopedGuard<'static, i64>>);

impl Drop for GuardStack {
    fn drop(&mut self) {
        while let Some(guard) = self.0.pop() {
            drop(guard);
        }
    }
}

/// Nested overrides always expose the innermost value and unwind to the permanent one.
#[test]
fn test_stack_discipline_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&prop::collection::vec(any::<i64>(), 0..16), |values| {
            let mut guards = GuardStack(Vec::with_capacity(values.len()));
            for value in &values {
                guards.0.push(DEPTH_LIMIT.set_scoped(*value));
                prop_assert_eq!(DEPTH_LIMIT.get(), *value);
            }
            prop_assert_eq!(DEPTH_LIMIT.scope_depth(), values.len());

            for index in (0..values.len()).rev() {
                let guard = guards.0.pop().unwrap();
                guard.release().unwrap();
                let expected = if index == 0 { -1 } else { values[index - 1] };
                prop_assert_eq!(DEPTH_LIMIT.get(), expected);
            }
            prop_assert_eq!(DEPTH_LIMIT.scope_depth(), 0);
            Ok(())
        })
        .unwrap();
}

proptest! {
    /// Entering and exiting a scoped setting as a context manager restores the value.
    #[test]
    fn test_scoped_setting_round_trip(outer in any::<i64>(), inner in any::<i64>()) {
        let _outer = DEPTH_LIMIT.set_scoped(outer);
        let setting = DEPTH_LIMIT.scoped_setting(inner);
        let scope = setting.enter().unwrap();
        prop_assert_eq!(DEPTH_LIMIT.get(), inner);
        scope.exit().unwrap();
        prop_assert_eq!(DEPTH_LIMIT.get(), outer);
    }
}

#[test]
fn test_overrides_do_not_leak_across_threads() {
    let _scope = DEPTH_LIMIT.set_scoped(42);
    let snapshot = ContextSnapshot::capture();

    let (plain, restored) = std::thread::spawn(move || {
        let plain = DEPTH_LIMIT.get();
        let restored = snapshot.run(|| DEPTH_LIMIT.get());
        (plain, restored)
    })
    .join()
    .unwrap();

    assert_eq!(plain, -1);
    assert_eq!(restored, 42);
    assert_eq!(DEPTH_LIMIT.get(), 42);
}
