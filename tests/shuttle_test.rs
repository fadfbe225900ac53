#![cfg(feature = "shuttle")]

mod common;

use shuttle::scheduler::RandomScheduler;
use shuttle::{Config, PortfolioRunner};
use test_log::test;

#[test]
fn two_processor_shuttle_test() {
    let mut portfolio_runner = PortfolioRunner::new(true, Config::new());
    for _ in 0..32 {
        portfolio_runner.add(RandomScheduler::new(10000usize));
    }
    portfolio_runner.run(|| {
        common::concurrency_test::<2>();
    });
}

#[test]
fn four_processor_shuttle_test() {
    shuttle::check_random(
        || {
            common::concurrency_test::<4>();
        },
        1000,
    );
}
