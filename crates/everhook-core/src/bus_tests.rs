use super::*;
use everhook_protocols::points::{
    MAIN_MENU_BUTTONS_CREATED, MainMenuButtons, MenuButton, PROCESS_EXITING, ProcessExiting,
};
use parking_lot::Mutex;

fn bus() -> (Arc<ExtensionBus>, Arc<ModuleScope>) {
    let scope = Arc::new(ModuleScope::new());
    (Arc::new(ExtensionBus::new(Arc::clone(&scope))), scope)
}

fn exiting() -> ProcessExiting {
    ProcessExiting {
        reason: "test".into(),
    }
}

#[test]
fn test_publish_in_subscription_order() {
    let (bus, _) = bus();
    for label in ["first", "second", "third"] {
        bus.subscribe(MAIN_MENU_BUTTONS_CREATED, move |menu: &mut MainMenuButtons| {
            menu.buttons.push(MenuButton::new(label));
        })
        .unwrap();
    }

    let mut menu = MainMenuButtons::default();
    assert_eq!(bus.publish(MAIN_MENU_BUTTONS_CREATED, &mut menu).unwrap(), 3);
    let labels: Vec<_> = menu.buttons.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["first", "second", "third"]);
}

#[test]
fn test_publish_without_subscribers() {
    let (bus, _) = bus();
    assert_eq!(bus.publish(PROCESS_EXITING, &mut exiting()).unwrap(), 0);
    assert!(bus.is_empty());
}

#[test]
fn test_unsubscribe() {
    let (bus, _) = bus();
    let hits = Arc::new(Mutex::new(0));
    let h = Arc::clone(&hits);
    let handle = bus
        .subscribe(PROCESS_EXITING, move |_: &mut ProcessExiting| *h.lock() += 1)
        .unwrap();
    bus.publish(PROCESS_EXITING, &mut exiting()).unwrap();
    bus.unsubscribe(&handle).unwrap();
    bus.publish(PROCESS_EXITING, &mut exiting()).unwrap();
    assert_eq!(*hits.lock(), 1);

    assert!(matches!(
        bus.unsubscribe(&handle),
        Err(BusError::NotSubscribed(id)) if id == handle.id()
    ));
}

#[test]
fn test_unsubscribe_during_dispatch_keeps_iteration() {
    let (bus, _) = bus();
    let order = Arc::new(Mutex::new(Vec::new()));
    let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::default();

    let (b, o, v) = (Arc::clone(&bus), Arc::clone(&order), Arc::clone(&victim));
    bus.subscribe(PROCESS_EXITING, move |_: &mut ProcessExiting| {
        o.lock().push("a");
        if let Some(handle) = v.lock().take() {
            b.unsubscribe(&handle).unwrap();
        }
    })
    .unwrap();
    let o = Arc::clone(&order);
    let second = bus
        .subscribe(PROCESS_EXITING, move |_: &mut ProcessExiting| o.lock().push("b"))
        .unwrap();
    *victim.lock() = Some(second);

    // "b" was captured before "a" removed it.
    bus.publish(PROCESS_EXITING, &mut exiting()).unwrap();
    assert_eq!(*order.lock(), vec!["a", "b"]);

    bus.publish(PROCESS_EXITING, &mut exiting()).unwrap();
    assert_eq!(*order.lock(), vec!["a", "b", "a"]);
    assert_eq!(bus.subscriber_count(PROCESS_EXITING.name()), 1);
}

#[test]
fn test_subscribe_during_dispatch_applies_next_time() {
    let (bus, _) = bus();
    let hits = Arc::new(Mutex::new(0));
    let (b, h) = (Arc::clone(&bus), Arc::clone(&hits));
    bus.subscribe(PROCESS_EXITING, move |_: &mut ProcessExiting| {
        let h = Arc::clone(&h);
        b.subscribe(PROCESS_EXITING, move |_: &mut ProcessExiting| *h.lock() += 1)
            .unwrap();
    })
    .unwrap();

    assert_eq!(bus.publish(PROCESS_EXITING, &mut exiting()).unwrap(), 1);
    assert_eq!(*hits.lock(), 0);
    assert_eq!(bus.publish(PROCESS_EXITING, &mut exiting()).unwrap(), 2);
    assert_eq!(*hits.lock(), 1);
}

#[test]
fn test_payload_type_is_fixed_per_point() {
    let (bus, _) = bus();
    const WRONG: ExtensionPoint<u32> = ExtensionPoint::new("process-exiting");

    bus.subscribe(PROCESS_EXITING, |_: &mut ProcessExiting| {}).unwrap();
    assert!(matches!(
        bus.subscribe(WRONG, |_: &mut u32| {}),
        Err(BusError::SignatureMismatch { point: "process-exiting", .. })
    ));
    assert!(matches!(
        bus.publish(WRONG, &mut 7),
        Err(BusError::SignatureMismatch { .. })
    ));
    assert_eq!(bus.len(), 1);
}

#[test]
fn test_owner_attribution() {
    let (bus, scope) = bus();
    {
        let _g = scope.enter("menu-mod");
        bus.subscribe(PROCESS_EXITING, |_: &mut ProcessExiting| {}).unwrap();
        bus.subscribe(MAIN_MENU_BUTTONS_CREATED, |_: &mut MainMenuButtons| {})
            .unwrap();
    }
    bus.subscribe(PROCESS_EXITING, |_: &mut ProcessExiting| {}).unwrap();

    let owned = bus.owned_by("menu-mod");
    assert_eq!(owned.len(), 2);
    assert!(owned[0].id() < owned[1].id());
    assert_eq!(owned[1].point(), MAIN_MENU_BUTTONS_CREATED.name());

    let snapshot = bus.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[2].owner, None);

    for handle in owned {
        bus.unsubscribe(&handle).unwrap();
    }
    assert!(bus.owned_by("menu-mod").is_empty());
    assert_eq!(bus.len(), 1);
}

#[test]
fn test_frozen_bus_still_publishes() {
    let (bus, _) = bus();
    let hits = Arc::new(Mutex::new(0));
    let h = Arc::clone(&hits);
    let handle = bus
        .subscribe(PROCESS_EXITING, move |_: &mut ProcessExiting| *h.lock() += 1)
        .unwrap();
    bus.freeze();

    assert!(matches!(
        bus.subscribe(PROCESS_EXITING, |_: &mut ProcessExiting| {}),
        Err(BusError::Frozen("subscribe"))
    ));
    assert!(matches!(bus.unsubscribe(&handle), Err(BusError::Frozen(_))));
    bus.publish(PROCESS_EXITING, &mut exiting()).unwrap();
    assert_eq!(*hits.lock(), 1);
}
