//! Descriptor accounting across many requests on one connection.
//!
//! Kept in its own test binary so no other test opens descriptors in the same
//! process while the count is sampled.

use std::time::Duration;

use netexec::test_support::{TestServer, exchange, open_fd_count, wait_until};

#[test]
fn sequential_requests_do_not_leak_descriptors_or_files() {
    let server = TestServer::start();
    let mut stream = server.connect();

    exchange(&mut stream, "echo warmup", "Child exited with status 0\nwarmup\n");
    assert!(wait_until(Duration::from_secs(2), || server.capture_files() == 0));
    let baseline = open_fd_count();

    for i in 0..50 {
        if i % 2 == 0 {
            exchange(
                &mut stream,
                &format!("echo {i}"),
                &format!("Child exited with status 0\n{i}\n"),
            );
        } else {
            exchange(&mut stream, "false", "Child exited with status 1\n");
        }
    }

    assert!(
        wait_until(Duration::from_secs(2), || open_fd_count() == baseline),
        "descriptor count drifted from {baseline} to {}",
        open_fd_count()
    );
    assert_eq!(server.capture_files(), 0);
}
