use std::cell::{Cell, RefCell};
use std::rc::Rc;

use linkrpc_dispatch::testing::{MockChannel, MockHandle};
use linkrpc_dispatch::{
    CallOptions, ChannelEvent, ChannelId, DispatchError, DispatchEvent, Dispatcher,
    DispatcherConfig, RpcError,
};
use serde_json::{json, Value};

type Log = Rc<RefCell<Vec<String>>>;
type Outcome = Rc<RefCell<Option<Result<Value, RpcError>>>>;

fn open_default(d: &mut Dispatcher) -> (ChannelId, MockHandle) {
    let (channel, handle) = MockChannel::new();
    let id = d.add_channel("*", Box::new(channel));
    handle.open();
    d.process_events();
    (id, handle)
}

fn add_math(d: &mut Dispatcher, invoked: Rc<Cell<usize>>) {
    d.add_handler("Math.Add", None, move |d, ri, _, args| {
        invoked.set(invoked.get() + 1);
        let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
        d.respond(ri, json!(sum)).unwrap();
    })
    .unwrap();
}

fn record(outcome: &Outcome) -> impl FnOnce(&mut Dispatcher, &linkrpc_dispatch::FrameInfo, Result<Value, RpcError>) + 'static {
    let sink = Rc::clone(outcome);
    move |_, _, result| {
        *sink.borrow_mut() = Some(result);
    }
}

#[test]
fn request_is_answered_with_exact_bytes() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let invoked = Rc::new(Cell::new(0));
    add_math(&mut d, Rc::clone(&invoked));

    h.deliver(r#"{"id":1,"method":"Math.Add","params":{"a":2,"b":3}}"#);
    d.process_events();

    assert_eq!(invoked.get(), 1);
    assert_eq!(h.sent(), vec![br#"{"id":1,"src":"device","result":5}"#.to_vec()]);
}

#[test]
fn response_swaps_src_and_dst() {
    let mut d = Dispatcher::new(DispatcherConfig::default().with_id("dev-1"));
    let (_, h) = open_default(&mut d);
    add_math(&mut d, Rc::new(Cell::new(0)));

    h.deliver(r#"{"id":"abc","src":"client","dst":"dev-1","tag":"t1","method":"Math.Add","args":{"a":1,"b":1}}"#);
    d.process_events();

    assert_eq!(
        h.sent(),
        vec![br#"{"id":"abc","src":"dev-1","dst":"client","tag":"t1","result":2}"#.to_vec()]
    );
}

#[test]
fn call_before_open_is_queued_then_sent_once() {
    let mut d = Dispatcher::default();
    let (channel, h) = MockChannel::new();
    d.add_channel("*", Box::new(channel));

    let outcome: Outcome = Rc::default();
    d.call_with("Foo", None, &CallOptions::default(), record(&outcome))
        .unwrap();
    assert_eq!(d.queued_frames(), 1);
    assert!(h.sent().is_empty());

    h.open();
    d.process_events();

    assert_eq!(h.sent().len(), 1);
    assert_eq!(d.queued_frames(), 0);
    assert_eq!(h.sent_json()[0]["method"], "Foo");
    assert!(outcome.borrow().is_none());
}

#[test]
fn unknown_method_gets_404() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);

    h.deliver(r#"{"id":7,"method":"DoesNotExist"}"#);
    d.process_events();

    let sent = h.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["id"], 7);
    assert_eq!(sent[0]["error"]["code"], 404);
    assert_eq!(sent[0]["error"]["message"], "No handler for DoesNotExist");
}

#[test]
fn unknown_notification_is_dropped_silently() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);

    h.deliver(r#"{"method":"DoesNotExist"}"#);
    d.process_events();

    assert!(h.sent().is_empty());
    assert_eq!(h.closes(), 0);
}

#[test]
fn pending_overflow_fires_oldest_callback_before_call_returns() {
    let mut d = Dispatcher::new(DispatcherConfig::default().with_max_pending_requests(1));
    let (_, _h) = open_default(&mut d);
    let log: Log = Rc::default();

    let first = Rc::clone(&log);
    d.call_with("First", None, &CallOptions::default(), move |_, _, result| {
        let code = result.err().map(|err| err.code);
        first.borrow_mut().push(format!("first:{code:?}"));
    })
    .unwrap();

    let second = Rc::clone(&log);
    d.call_with("Second", None, &CallOptions::default(), move |_, _, _| {
        second.borrow_mut().push("second".to_string());
    })
    .unwrap();
    log.borrow_mut().push("returned".to_string());

    assert_eq!(*log.borrow(), vec!["first:Some(429)", "returned"]);
    assert_eq!(d.pending_requests(), 1);
}

#[test]
fn uri_destination_creates_channel_through_factory() {
    let mut d = Dispatcher::default();
    let built = Rc::new(Cell::new(0));
    let handle: Rc<RefCell<Option<MockHandle>>> = Rc::default();

    let counter = Rc::clone(&built);
    let slot = Rc::clone(&handle);
    d.add_channel_factory("ws", move |scheme, canonical, fragment| {
        assert_eq!(scheme, "ws");
        assert_eq!(canonical, "ws://host:1234/x");
        assert_eq!(fragment, "");
        counter.set(counter.get() + 1);
        let (channel, h) = MockChannel::new();
        *slot.borrow_mut() = Some(h);
        Some(Box::new(channel) as Box<dyn linkrpc_dispatch::Channel>)
    });

    d.notify("Foo", None, &CallOptions::to("ws://host:1234/x")).unwrap();
    assert_eq!(built.get(), 1);
    let h = handle.borrow().clone().expect("factory ran");
    assert_eq!(h.connects(), 1);
    assert_eq!(d.channel_infos()[0].dst, "ws://host:1234/x");

    // Equivalent URI reuses the registered channel.
    d.notify("Bar", None, &CallOptions::to("WS://HOST:1234/a/../x"))
        .unwrap();
    assert_eq!(built.get(), 1);
    assert_eq!(d.queued_frames(), 2);

    h.open();
    d.process_events();
    let sent = h.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["method"], "Foo");
    assert!(sent[0].get("dst").is_none());
}

#[test]
fn frames_for_a_closed_uri_link_are_dropped_with_it() {
    let mut d = Dispatcher::default();
    let (_, default) = open_default(&mut d);
    let built = Rc::new(Cell::new(0));
    let handle: Rc<RefCell<Option<MockHandle>>> = Rc::default();

    let counter = Rc::clone(&built);
    let slot = Rc::clone(&handle);
    d.add_channel_factory("ws", move |_, _, _| {
        counter.set(counter.get() + 1);
        let (channel, h) = MockChannel::new();
        *slot.borrow_mut() = Some(h);
        Some(Box::new(channel) as Box<dyn linkrpc_dispatch::Channel>)
    });

    d.notify("Foo", None, &CallOptions::to("ws://host/x")).unwrap();
    assert_eq!((built.get(), d.queued_frames()), (1, 1));

    let link = handle.borrow().clone().expect("factory ran");
    link.close();
    d.process_events();
    assert!(link.is_destroyed());
    assert_eq!(d.queued_frames(), 0);

    // Later drains triggered by other channels do not rebuild the link.
    for _ in 0..3 {
        d.notify("Tick", None, &CallOptions::default()).unwrap();
        default.complete_send();
        d.process_events();
    }
    assert_eq!(built.get(), 1);
    assert_eq!(d.channel_infos().len(), 1);
}

#[test]
fn unknown_scheme_is_no_route() {
    let mut d = Dispatcher::default();
    let err = d
        .call_with("Foo", None, &CallOptions::to("mqtt://broker/"), |_, _, _| {})
        .unwrap_err();
    assert!(matches!(err, DispatchError::NoRoute(_)));
    assert_eq!(d.pending_requests(), 0);
    assert_eq!(d.queued_frames(), 0);
}

#[test]
fn unknown_id_without_default_channel_is_no_route() {
    let mut d = Dispatcher::default();
    let err = d.notify("Foo", None, &CallOptions::to("cloud")).unwrap_err();
    assert!(matches!(err, DispatchError::NoRoute(dst) if dst == "cloud"));
}

#[test]
fn unknown_id_falls_back_to_default_channel() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    d.notify("Foo", None, &CallOptions::to("cloud")).unwrap();
    assert_eq!(h.sent_json()[0]["dst"], "cloud");
}

#[test]
fn busy_channel_gets_one_send_at_a_time_in_order() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);

    for method in ["A", "B", "C"] {
        d.notify(method, None, &CallOptions::default()).unwrap();
    }
    assert_eq!(h.sent().len(), 1);
    assert_eq!(d.queued_frames(), 2);

    h.complete_send();
    d.process_events();
    assert_eq!(h.sent().len(), 2);

    h.complete_send();
    d.process_events();
    let methods: Vec<Value> = h.sent_json().iter().map(|f| f["method"].clone()).collect();
    assert_eq!(methods, vec![json!("A"), json!("B"), json!("C")]);
    assert_eq!(d.queued_frames(), 0);
}

#[test]
fn no_queue_fails_fast_and_rolls_back_pending() {
    let mut d = Dispatcher::default();
    let (channel, _h) = MockChannel::new();
    d.add_channel("*", Box::new(channel));

    let err = d
        .call_with("Foo", None, &CallOptions::default().no_queue(), |_, _, _| {})
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotSent(_)));
    assert_eq!(d.pending_requests(), 0);
    assert_eq!(d.queued_frames(), 0);
}

#[test]
fn zero_capacity_queue_refuses_frames() {
    let mut d = Dispatcher::new(DispatcherConfig::default().with_max_queue_length(0));
    let (channel, _h) = MockChannel::new();
    d.add_channel("*", Box::new(channel));

    assert!(d.notify("Foo", None, &CallOptions::default()).is_err());
    assert_eq!(d.queued_frames(), 0);
}

#[test]
fn outgoing_queue_keeps_newest_frames() {
    let mut d = Dispatcher::new(DispatcherConfig::default().with_max_queue_length(2));
    let (channel, h) = MockChannel::new();
    d.add_channel("*", Box::new(channel));

    for method in ["A", "B", "C"] {
        d.notify(method, None, &CallOptions::default()).unwrap();
    }
    assert_eq!(d.queued_frames(), 2);

    h.open();
    d.process_events();
    h.complete_send();
    d.process_events();
    let methods: Vec<Value> = h.sent_json().iter().map(|f| f["method"].clone()).collect();
    assert_eq!(methods, vec![json!("B"), json!("C")]);
}

#[test]
fn response_reaches_callback_once() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let outcome: Outcome = Rc::default();

    let id = d
        .call_with("Foo", Some(json!({"x": 1})), &CallOptions::default(), record(&outcome))
        .unwrap();
    let reply = format!(r#"{{"id":{},"result":{{"ok":true}}}}"#, id);
    h.deliver(reply.clone());
    d.process_events();
    assert_eq!(outcome.borrow_mut().take(), Some(Ok(json!({"ok": true}))));

    // A duplicate is an unknown id: ignored, channel stays up.
    h.deliver(reply);
    d.process_events();
    assert!(outcome.borrow().is_none());
    assert_eq!(h.closes(), 0);
}

#[test]
fn error_response_reaches_callback() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let outcome: Outcome = Rc::default();

    let id = d
        .call_with("Foo", None, &CallOptions::default(), record(&outcome))
        .unwrap();
    h.deliver(format!(r#"{{"id":{id},"error":{{"code":-32,"message":"nope"}}}}"#));
    d.process_events();

    assert_eq!(outcome.borrow_mut().take(), Some(Err(RpcError::new(-32, "nope"))));
}

#[test]
fn callback_without_reply_never_fires() {
    let fired = Rc::new(Cell::new(false));
    {
        let mut d = Dispatcher::default();
        let (_, _h) = open_default(&mut d);
        let flag = Rc::clone(&fired);
        d.call_with("Foo", None, &CallOptions::default(), move |_, _, _| flag.set(true))
            .unwrap();
        assert_eq!(d.pending_requests(), 1);
    }
    assert!(!fired.get());
}

#[test]
fn cancelled_call_ignores_late_reply() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let fired = Rc::new(Cell::new(false));
    let flag = Rc::clone(&fired);

    let id = d
        .call_with("Foo", None, &CallOptions::default(), move |_, _, _| flag.set(true))
        .unwrap();
    assert!(d.cancel_call(&id));
    assert!(!d.cancel_call(&id));

    h.deliver(format!(r#"{{"id":{id},"result":1}}"#));
    d.process_events();
    assert!(!fired.get());
}

#[test]
fn malformed_frame_closes_non_persistent_channel() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    h.deliver("not json");
    d.process_events();
    assert_eq!(h.closes(), 1);
}

#[test]
fn malformed_frame_leaves_persistent_channel_open() {
    let mut d = Dispatcher::default();
    let (channel, h) = MockChannel::new();
    let id = d.add_channel("*", Box::new(channel.persistent()));
    h.open();
    h.deliver("[1,2,3]");
    d.process_events();
    assert_eq!(h.closes(), 0);
    assert!(d.channel_info(id).is_some_and(|info| info.is_open));
}

#[test]
fn frame_for_other_device_is_rejected() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let invoked = Rc::new(Cell::new(0));
    add_math(&mut d, Rc::clone(&invoked));

    h.deliver(r#"{"id":1,"dst":"someone-else","method":"Math.Add"}"#);
    d.process_events();

    assert_eq!(invoked.get(), 0);
    assert!(h.sent().is_empty());
    assert_eq!(h.closes(), 1);
}

#[test]
fn channel_learns_dst_from_first_frame() {
    let mut d = Dispatcher::default();
    let (channel, h) = MockChannel::new();
    let id = d.add_channel("", Box::new(channel));
    h.open();
    h.deliver(r#"{"src":"peer-9","method":"Ping"}"#);
    d.process_events();
    assert_eq!(d.channel_info(id).unwrap().dst, "peer-9");

    d.notify("Hello", None, &CallOptions::to("peer-9")).unwrap();
    assert_eq!(h.sent_json()[0]["dst"], "peer-9");
}

#[test]
fn non_persistent_close_unregisters_and_destroys() {
    let mut d = Dispatcher::default();
    let (channel, h) = MockChannel::new();
    let id = d.add_channel("peer", Box::new(channel));
    h.close();
    d.process_events();

    assert!(d.channel_info(id).is_none());
    assert!(h.is_destroyed());
}

#[test]
fn persistent_close_keeps_registration_and_reopens() {
    let mut d = Dispatcher::default();
    let (channel, h) = MockChannel::new();
    let id = d.add_channel("*", Box::new(channel.persistent()));
    h.open();
    h.close();
    d.process_events();
    assert!(!d.is_connected());
    assert!(!h.is_destroyed());

    d.notify("Later", None, &CallOptions::default()).unwrap();
    h.open();
    d.process_events();
    assert!(d.is_connected());
    assert_eq!(h.sent_json()[0]["method"], "Later");
    assert!(d.channel_info(id).is_some());
}

#[test]
fn respond_after_arrival_channel_closed_reroutes() {
    let mut d = Dispatcher::default();
    let (_, default) = open_default(&mut d);
    let (channel, h) = MockChannel::new();
    d.add_channel("", Box::new(channel));
    h.open();
    d.process_events();

    let parked = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&parked);
    d.add_handler("Slow", None, move |_, ri, _, _| {
        *slot.borrow_mut() = Some(ri);
    })
    .unwrap();

    h.deliver(r#"{"id":5,"src":"gone","method":"Slow"}"#);
    h.close();
    d.process_events();

    let ri = parked.borrow_mut().take().expect("handler ran");
    d.respond(ri, json!("late")).unwrap();
    let sent = default.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["dst"], "gone");
    assert_eq!(sent[0]["result"], "late");
}

#[test]
fn broadcast_reaches_every_enabled_channel() {
    let mut d = Dispatcher::default();
    let (a, ha) = MockChannel::new();
    let (b, hb) = MockChannel::new();
    let (c, hc) = MockChannel::new();
    d.add_channel("a", Box::new(a.broadcast()));
    d.add_channel("b", Box::new(b.broadcast()));
    d.add_channel("c", Box::new(c));
    for h in [&ha, &hb, &hc] {
        h.open();
    }
    d.process_events();

    d.notify("Announce", None, &CallOptions::default().broadcast())
        .unwrap();
    assert_eq!(ha.sent().len(), 1);
    assert_eq!(hb.sent().len(), 1);
    assert!(hc.sent().is_empty());
}

#[test]
fn broadcast_with_no_taker_fails() {
    let mut d = Dispatcher::default();
    let (a, _ha) = MockChannel::new();
    d.add_channel("a", Box::new(a.broadcast()));
    let err = d
        .notify("Announce", None, &CallOptions::default().broadcast())
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotSent(_)));
    assert_eq!(d.queued_frames(), 0);
}

#[test]
fn observers_see_channel_events_and_dispatches() {
    let mut d = Dispatcher::default();
    let log: Log = Rc::default();
    let sink = Rc::clone(&log);
    let observer = d.add_observer(move |event| {
        let line = match event {
            DispatchEvent::ChannelOpened { dst } => format!("open {dst}"),
            DispatchEvent::ChannelClosed { dst } => format!("closed {dst}"),
            DispatchEvent::DispatchFrame { frame } => {
                format!("frame {}", String::from_utf8_lossy(frame))
            }
        };
        sink.borrow_mut().push(line);
    });

    let (_, h) = open_default(&mut d);
    d.notify("Foo", None, &CallOptions::default()).unwrap();
    h.close();
    d.process_events();
    assert!(d.remove_observer(observer));
    d.notify("Bar", None, &CallOptions::default()).ok();

    assert_eq!(
        *log.borrow(),
        vec![
            "open *".to_string(),
            r#"frame {"src":"device","method":"Foo"}"#.to_string(),
            "closed *".to_string(),
        ]
    );
}

#[test]
fn prehandler_can_veto() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let invoked = Rc::new(Cell::new(0));
    add_math(&mut d, Rc::clone(&invoked));
    d.set_prehandler(|d, ri, _, _| {
        if ri.method == "Math.Add" {
            d.respond_error(ri, 403, "forbidden").unwrap();
            return None;
        }
        Some(ri)
    });

    h.deliver(r#"{"id":1,"method":"Math.Add","params":{"a":1,"b":2}}"#);
    d.process_events();

    assert_eq!(invoked.get(), 0);
    assert_eq!(h.sent_json()[0]["error"]["code"], 403);
}

#[test]
fn wildcard_handler_serves_prefix() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    d.add_handler("Sys.*", None, |d, ri, fi, _| {
        let answer = json!({"method": ri.method, "via": fi.channel_type});
        d.respond(ri, answer).unwrap();
    })
    .unwrap();

    h.deliver(r#"{"id":2,"method":"sys.reboot"}"#);
    d.process_events();
    assert_eq!(h.sent_json()[0]["result"], json!({"method": "sys.reboot", "via": "mock"}));
}

#[cfg(feature = "schema")]
#[test]
fn params_failing_descriptor_get_400() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    let invoked = Rc::new(Cell::new(0));
    let counter = Rc::clone(&invoked);
    d.add_handler(
        "Math.Add",
        Some(json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        })),
        move |d, ri, _, _| {
            counter.set(counter.get() + 1);
            d.respond(ri, json!(0)).unwrap();
        },
    )
    .unwrap();

    h.deliver(r#"{"id":3,"method":"Math.Add","params":{"a":"two"}}"#);
    d.process_events();

    assert_eq!(invoked.get(), 0);
    let sent = h.sent_json();
    assert_eq!(sent[0]["error"]["code"], 400);
    assert!(sent[0]["error"]["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid args: "));
}

#[test]
fn pre_parsed_request_is_answered() {
    let mut d = Dispatcher::default();
    let (id, h) = open_default(&mut d);
    add_math(&mut d, Rc::new(Cell::new(0)));

    let frame = linkrpc_frame::parse(br#"{"id":4,"src":"app","method":"Math.Add","params":{"a":4,"b":5}}"#)
        .unwrap();
    d.handle_channel_event(id, ChannelEvent::FrameReceivedParsed(frame));

    assert_eq!(
        h.sent(),
        vec![br#"{"id":4,"src":"device","dst":"app","result":9}"#.to_vec()]
    );
}

#[test]
fn refused_send_is_queued_and_retried_on_next_drain() {
    let mut d = Dispatcher::default();
    let (_, h) = open_default(&mut d);
    assert!(d.can_send());

    h.set_accept_sends(false);
    d.notify("Retry", None, &CallOptions::default()).unwrap();
    assert!(h.sent().is_empty());
    assert_eq!(d.queued_frames(), 1);
    // A refused send leaves the channel idle.
    assert!(d.can_send());

    h.set_accept_sends(true);
    h.complete_send();
    d.process_events();

    assert_eq!(d.queued_frames(), 0);
    assert_eq!(h.sent_json()[0]["method"], "Retry");
}
