use std::cell::RefCell;
use std::rc::Rc;
use unibox_runtime::*;

type Log = Rc<RefCell<Vec<String>>>;

/// Two units, both with an initializer, each logging what ran
fn registry(log: &Log) -> CommandRegistry {
    let mut builder = CommandRegistry::builder();
    for (name, status) in [("cat", 0), ("false", 1)] {
        let init_log = Rc::clone(log);
        let entry_log = Rc::clone(log);
        builder
            .register(
                name,
                Box::new(move || init_log.borrow_mut().push(format!("init {}", name))),
                Box::new(move |args: &[String]| {
                    entry_log
                        .borrow_mut()
                        .push(format!("main {} {:?}", name, args));
                    status
                }),
            )
            .unwrap();
    }
    builder.build()
}

#[test]
fn test_runs_only_selected_unit() {
    let log: Log = Rc::default();
    let registry = registry(&log);
    let mut dispatcher = Dispatcher::new("unibox", &registry);

    assert_eq!(dispatcher.state(), &DispatchState::Idle);
    let status = dispatcher
        .run(&InvocationContext::new(["/bin/cat", "a.txt"]))
        .unwrap();

    assert_eq!(status, 0);
    assert_eq!(
        *log.borrow(),
        vec!["init cat".to_string(), "main cat [\"a.txt\"]".to_string()]
    );
    assert_eq!(dispatcher.state(), &DispatchState::Terminated(0));
}

#[test]
fn test_multiplexer_name_forwards_remaining_args() {
    let log: Log = Rc::default();
    let registry = registry(&log);
    let mut dispatcher = Dispatcher::new("unibox", &registry);

    let status = dispatcher
        .run(&InvocationContext::new(["unibox", "false", "-x", "cat"]))
        .unwrap();

    assert_eq!(status, 1);
    assert_eq!(
        *log.borrow(),
        vec![
            "init false".to_string(),
            "main false [\"-x\", \"cat\"]".to_string()
        ]
    );
}

#[test]
fn test_unknown_command() {
    let log: Log = Rc::default();
    let registry = registry(&log);
    let mut dispatcher = Dispatcher::new("unibox", &registry);

    let err = dispatcher
        .run(&InvocationContext::new(["unibox", "cats"]))
        .unwrap_err();

    match &err {
        DispatchError::UnknownCommand {
            name, suggestions, ..
        } => {
            assert_eq!(name, "cats");
            assert_eq!(suggestions, &vec!["cat".to_string()]);
        }
        other => panic!("expected UnknownCommand, got {:?}", other),
    }
    assert_eq!(err.exit_status(), UNKNOWN_COMMAND_STATUS);
    assert_eq!(err.exit_status(), 127);
    assert!(err.to_string().contains("`cats`"));
    assert!(log.borrow().is_empty());
    assert_eq!(
        dispatcher.state(),
        &DispatchState::Terminated(UNKNOWN_COMMAND_STATUS)
    );
}

#[test]
fn test_unit_name_after_foreign_invocation_name_is_not_run() {
    let log: Log = Rc::default();
    let registry = registry(&log);
    let mut dispatcher = Dispatcher::new("unibox", &registry);

    let err = dispatcher
        .run(&InvocationContext::new(["/usr/bin/somethingelse", "cat"]))
        .unwrap_err();

    match &err {
        DispatchError::UnknownCommand { program, name, .. } => {
            assert_eq!(program, "unibox");
            assert_eq!(name, "somethingelse");
        }
        other => panic!("expected UnknownCommand, got {:?}", other),
    }
    assert_eq!(err.exit_status(), 127);
    assert!(log.borrow().is_empty());
    assert_eq!(
        dispatcher.state(),
        &DispatchState::Terminated(UNKNOWN_COMMAND_STATUS)
    );
}

#[test]
fn test_not_reentrant() {
    let log: Log = Rc::default();
    let registry = registry(&log);
    let mut dispatcher = Dispatcher::new("unibox", &registry);

    dispatcher.run(&InvocationContext::new(["cat"])).unwrap();
    let second = dispatcher.run(&InvocationContext::new(["false"]));

    assert_eq!(second, Err(DispatchError::AlreadyDispatched));
    assert_eq!(log.borrow().len(), 2);
    assert_eq!(dispatcher.state(), &DispatchState::Terminated(0));
}

#[test]
fn test_entry_status_is_process_status() {
    let registry = CommandRegistry::builder()
        .with("exit42", Box::new(|| {}), Box::new(|_: &[String]| 42))
        .unwrap()
        .build();
    let mut dispatcher = Dispatcher::new("unibox", &registry);
    assert_eq!(
        dispatcher.run_to_status(&InvocationContext::new(["unibox", "exit42"])),
        42
    );
}

#[test]
fn test_run_to_status_unknown() {
    let registry = CommandRegistry::builder().build();
    let mut dispatcher = Dispatcher::new("unibox", &registry);
    assert_eq!(
        dispatcher.run_to_status(&InvocationContext::new(["unibox", "nope"])),
        127
    );
}
