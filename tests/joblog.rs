use jobcntrl::model::{JobLog, JobLogLevel};

#[test]
fn entries_below_the_level_floor_are_discarded() {
    let mut log = JobLog::new(JobLogLevel::Info);
    log.problem("bad");
    log.info("note");
    log.detail("noise");

    assert_eq!(log.entries().len(), 2);
    assert!(log.has_problem());
}

#[test]
fn process_step_travels_with_entries() {
    let mut log = JobLog::new(JobLogLevel::Detail);
    log.info("before");
    log.set_process_step("import");
    log.info("during");
    log.set_process_step("");
    log.info("after");

    let steps: Vec<&str> = log.entries().iter().map(|e| e.process_step.as_str()).collect();
    assert_eq!(steps, vec![".", "import", "."]);
}

#[test]
fn overflow_ratchets_the_level_down_and_drops_noise() {
    let mut log = JobLog::with_limit(JobLogLevel::Detail, 10);
    log.problem("early problem");
    for i in 0..12 {
        log.detail(format!("detail {i}"));
    }

    // The floor dropped below Detail, so the details are gone and further
    // detail entries are ignored; the problem survives.
    assert!(log.level() < JobLogLevel::Detail);
    assert!(log.entries().iter().all(|e| e.level != JobLogLevel::Detail));
    assert!(log.has_problem());

    log.detail("still ignored");
    assert!(log.entries().iter().all(|e| e.level != JobLogLevel::Detail));
}

#[test]
fn problems_survive_even_a_tiny_limit() {
    let mut log = JobLog::with_limit(JobLogLevel::Detail, 4);
    for i in 0..8 {
        log.problem(format!("problem {i}"));
        log.info(format!("info {i}"));
    }

    assert_eq!(log.level(), JobLogLevel::Problem);
    assert!(log.entries().iter().all(|e| e.level == JobLogLevel::Problem));
    assert!(log.has_problem());
}
