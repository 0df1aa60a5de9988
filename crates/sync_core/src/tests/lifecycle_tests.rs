use super::*;

fn states(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn default_lifecycle_has_terminal_shipped_and_cancelled() {
    let lifecycle = StatusLifecycle::default();
    assert_eq!(lifecycle.initial(), "new");
    assert!(lifecycle.is_terminal("shipped"));
    assert!(lifecycle.is_terminal("cancelled"));
    assert!(!lifecycle.is_terminal("new"));
    assert_eq!(
        lifecycle.allowed_targets("new"),
        &["preparing".to_string(), "cancelled".to_string()]
    );
}

#[test]
fn default_config_and_default_lifecycle_agree() {
    let from_config =
        StatusLifecycle::from_config(&LifecycleConfig::default()).expect("default config");
    assert_eq!(from_config, StatusLifecycle::default());
}

#[test]
fn advancing_from_terminal_state_is_invalid() {
    let lifecycle = StatusLifecycle::default();
    let err = lifecycle
        .check_transition("shipped", "preparing")
        .expect_err("terminal");
    assert!(matches!(
        err,
        EngineError::InvalidTransition { ref from, ref to } if from == "shipped" && to == "preparing"
    ));
    assert!(lifecycle.check_transition("cancelled", "new").is_err());
}

#[test]
fn only_forward_transitions_are_allowed() {
    let lifecycle = StatusLifecycle::default();
    lifecycle
        .check_transition("new", "preparing")
        .expect("forward");
    lifecycle
        .check_transition("ready_to_ship", "shipped")
        .expect("forward");
    assert!(lifecycle.check_transition("preparing", "new").is_err());
    assert!(lifecycle.check_transition("new", "shipped").is_err());
    assert!(lifecycle.check_transition("new", "new").is_err());
}

#[test]
fn rejects_inconsistent_configuration() {
    let empty = LifecycleConfig {
        states: Vec::new(),
        initial: "new".into(),
        transitions: BTreeMap::new(),
    };
    assert_eq!(
        StatusLifecycle::from_config(&empty),
        Err(LifecycleError::Empty)
    );

    let duplicate = LifecycleConfig {
        states: states(&["new", "new"]),
        initial: "new".into(),
        transitions: BTreeMap::new(),
    };
    assert_eq!(
        StatusLifecycle::from_config(&duplicate),
        Err(LifecycleError::DuplicateState("new".into()))
    );

    let unknown_initial = LifecycleConfig {
        states: states(&["new"]),
        initial: "draft".into(),
        transitions: BTreeMap::new(),
    };
    assert_eq!(
        StatusLifecycle::from_config(&unknown_initial),
        Err(LifecycleError::UnknownInitial("draft".into()))
    );

    let mut transitions = BTreeMap::new();
    transitions.insert("new".to_string(), states(&["archived"]));
    let unknown_target = LifecycleConfig {
        states: states(&["new"]),
        initial: "new".into(),
        transitions,
    };
    assert!(matches!(
        StatusLifecycle::from_config(&unknown_target),
        Err(LifecycleError::UnknownTransition { .. })
    ));
}

#[test]
fn normalize_maps_unknown_status_to_initial() {
    let lifecycle = StatusLifecycle::default();
    assert_eq!(lifecycle.normalize(Some("preparing")), "preparing");
    assert_eq!(lifecycle.normalize(Some("lost")), "new");
    assert_eq!(lifecycle.normalize(None), "new");
}

#[test]
fn counts_always_sum_to_total() {
    let lifecycle = StatusLifecycle::default();
    let counts = lifecycle.count(["new", "new", "preparing", "shipped", "bogus", ""]);

    assert_eq!(counts.total(), 6);
    assert_eq!(counts.get("new"), 4);
    assert_eq!(counts.get("preparing"), 1);
    assert_eq!(counts.get("shipped"), 1);
    assert_eq!(counts.get("cancelled"), 0);
    assert_eq!(counts.iter().map(|(_, count)| count).sum::<usize>(), counts.total());
    assert_eq!(
        counts.iter().map(|(state, _)| state).collect::<Vec<_>>(),
        vec!["new", "preparing", "ready_to_ship", "shipped", "cancelled"]
    );
}
