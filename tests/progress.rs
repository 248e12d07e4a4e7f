use std::sync::mpsc;

use sensor_qc::{ProgressController, StatusController, StatusStyle};

#[test]
fn run_announces_start_and_end_on_the_status_line() {
    let status = StatusController::new();
    let rx = status.subscribe();
    let progress = ProgressController::new(status.clone());

    let (tx, done) = mpsc::channel();
    let handle = progress
        .run("range check", move || {
            tx.send(42).unwrap();
        })
        .unwrap();
    assert_eq!(done.recv().unwrap(), 42);
    handle.join().unwrap();

    let seen: Vec<_> = rx.try_iter().map(|i| (i.text, i.style)).collect();
    assert_eq!(
        seen,
        vec![
            ("Running: range check".to_string(), StatusStyle::Warning),
            ("Done: range check".to_string(), StatusStyle::Normal),
        ]
    );
    assert_eq!(status.current().text, "Done: range check");
}

#[test]
fn completed_counts_sequential_runs() {
    let progress = ProgressController::new(StatusController::new());
    for i in 0..3 {
        progress.run(&format!("job {i}"), || {}).unwrap().join().unwrap();
    }
    assert_eq!(progress.completed(), 3);
    assert!(!progress.is_busy());
}

#[test]
fn clones_share_the_busy_flag() {
    let progress = ProgressController::new(StatusController::new());
    let other = progress.clone();
    let (release, wait) = mpsc::channel::<()>();
    let handle = progress
        .run("first", move || {
            let _ = wait.recv();
        })
        .unwrap();

    assert!(other.is_busy());
    assert!(other.run("second", || {}).is_err());

    release.send(()).unwrap();
    handle.join().unwrap();
    assert!(!other.is_busy());
}
