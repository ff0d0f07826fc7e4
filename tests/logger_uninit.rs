use keel::logger::{self, LogMessage};

#[test]
fn global_is_empty_before_first_use() {
    assert!(logger::global().is_none());
}

#[test]
#[should_panic(expected = "before get_logger")]
fn logging_before_initialization_panics() {
    let _ = logger::log(&LogMessage::error("too early"));
}
