use stream_recorder::{ComponentLogger, LogContext};

#[test]
fn test_log_context_with_stream() {
    let ctx = LogContext::new("recording", "live/cam1/2026-10-19/150000").with_stream("live/cam1");

    assert_eq!(ctx.stream, Some("live/cam1".to_string()));
}

#[test]
fn test_log_formatting() {
    let ctx = LogContext::new("recording", "live/cam1");
    let formatted = ctx.format("closed (3 tags, 120 bytes)");

    assert!(formatted.starts_with("[recording:live/cam1]"));
    assert!(formatted.contains("[seq="));
    assert!(formatted.ends_with("closed (3 tags, 120 bytes)"));

    // Mit Stream
    let formatted = ctx.with_stream("live/cam1").format("opened");
    assert!(formatted.contains("stream=live/cam1"));
}

#[test]
fn test_component_logger_trait() {
    struct MockComponent {
        id: String,
    }

    impl ComponentLogger for MockComponent {
        fn log_context(&self) -> LogContext {
            LogContext::new("mock", &self.id)
        }
    }

    let component = MockComponent {
        id: "test_001".to_string(),
    };
    let ctx = component.log_context();

    assert_eq!(ctx.component, "mock");
    assert_eq!(ctx.instance_id, "test_001");

    // Default-Methoden dürfen ohne Logger-Init aufgerufen werden
    component.info("ok");
    component.warn("ok");
}
