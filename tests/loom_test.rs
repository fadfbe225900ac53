#![cfg(loom)]

mod common;

#[test]
fn two_processor_loom_test() {
    loom::model(|| {
        common::concurrency_test::<2>();
    })
}
