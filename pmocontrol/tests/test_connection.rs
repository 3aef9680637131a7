mod common;

use std::{sync::Arc, time::Duration};

use pmocontrol::{
    ConnectionError, ConnectionEvent, DeviceConnection, DiscoveryEvent, HttpResponse,
    RootDescriptor, ServiceEvent, TrackerEvent, UpnpNetworkTracker,
};
use pmoupnp::{
    UpnpError, error_codes,
    soap::build_soap_fault,
    variable_types::StateValue,
};

use common::*;

async fn ready_root(transport: Arc<MockTransport>) -> (Arc<UpnpNetworkTracker>, Arc<RootDescriptor>) {
    let discovery = Arc::new(FakeDiscovery::default());
    let tracker = UpnpNetworkTracker::new(cp_data(transport), discovery.clone());
    let events = tracker.events().subscribe();
    tracker.start().await.unwrap();
    discovery.emit(DiscoveryEvent::RootDeviceAdded(lan_entry()));
    let rd = wait_for(|| match events.try_recv() {
        Ok(TrackerEvent::RootDeviceAdded(rd)) => Some(rd),
        _ => None,
    })
    .await;
    (tracker, rd)
}

fn connect(tracker: &UpnpNetworkTracker, rd: Arc<RootDescriptor>) -> Arc<DeviceConnection> {
    DeviceConnection::new(tracker.shared_control_point_data().clone(), rd, ROOT_UUID, None).unwrap()
}

const GET_VOLUME_RESPONSE: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>42</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;

#[tokio::test]
async fn test_action_call_success() {
    let transport = MockTransport::with_renderer();
    transport.route(
        "POST",
        RC_CONTROL_URL,
        Route::Respond(xml(200, GET_VOLUME_RESPONSE)),
    );
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);

    let service = connection.device().find_service(RC_URN).unwrap();
    assert!(service.is_connected());
    let action = service.action("GetVolume").unwrap();

    let result = action.invoke(vec![StateValue::UI4(0)]).await.unwrap();
    assert_eq!(result, vec![StateValue::UI2(42)]);
    assert_eq!(connection.pending_call_count(), 0);

    let request = transport.requests_to("POST", RC_CONTROL_URL).remove(0);
    assert_eq!(
        request.header_value("SOAPACTION"),
        Some("\"urn:schemas-upnp-org:service:RenderingControl:1#GetVolume\"")
    );
    assert_eq!(
        request.header_value("CONTENT-TYPE"),
        Some("text/xml; charset=\"utf-8\"")
    );
    let body = String::from_utf8(request.body).unwrap();
    assert!(body.contains("<InstanceID>0</InstanceID>"));
}

#[tokio::test]
async fn test_action_call_errors() {
    let transport = MockTransport::with_renderer();
    let fault = build_soap_fault(
        "s:Client",
        "UPnPError",
        Some(&UpnpError::new(error_codes::ARGUMENT_VALUE_INVALID, "Invalid Instance")),
    )
    .unwrap();
    transport.route("POST", RC_CONTROL_URL, Route::Respond(xml(500, &fault)));
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let action = connection
        .device()
        .find_service(RC_URN)
        .unwrap()
        .action("GetVolume")
        .unwrap();

    match action.invoke(vec![StateValue::UI4(7)]).await {
        Err(ConnectionError::Protocol { error, .. }) => {
            assert_eq!(error.code, error_codes::ARGUMENT_VALUE_INVALID);
        }
        other => panic!("unexpected {:?}", other),
    }

    transport.route("POST", RC_CONTROL_URL, Route::Respond(HttpResponse::new(503)));
    assert!(matches!(
        action.invoke(vec![StateValue::UI4(7)]).await,
        Err(ConnectionError::Network { status: Some(503), .. })
    ));

    // Wrong argument type is rejected before anything is sent
    let sent = transport.requests_to("POST", RC_CONTROL_URL).len();
    assert!(matches!(
        action.invoke(vec![StateValue::from("zero")]).await,
        Err(ConnectionError::InvalidArguments(_))
    ));
    assert_eq!(transport.requests_to("POST", RC_CONTROL_URL).len(), sent);
}

#[tokio::test(start_paused = true)]
async fn test_action_timeout_is_reported_once() {
    let transport = MockTransport::with_renderer();
    transport.route("POST", RC_CONTROL_URL, Route::Hang);
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let action = connection
        .device()
        .find_service(RC_URN)
        .unwrap()
        .action("GetVolume")
        .unwrap();

    let started = tokio::time::Instant::now();
    let result = action.invoke(vec![StateValue::UI4(0)]).await;
    assert!(matches!(result, Err(ConnectionError::Timeout(_))));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(connection.pending_call_count(), 0);
}

#[tokio::test]
async fn test_disconnect_aborts_pending_calls() {
    let transport = MockTransport::with_renderer();
    transport.route("POST", RC_CONTROL_URL, Route::Hang);
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let events = connection.events().subscribe();
    let service = connection.device().find_service(RC_URN).unwrap();
    let action = service.action("GetVolume").unwrap();

    let call = tokio::spawn(async move { action.invoke(vec![StateValue::UI4(0)]).await });
    wait_for(|| (connection.pending_call_count() == 1).then_some(())).await;

    connection.disconnect(false);
    assert!(matches!(call.await.unwrap(), Err(ConnectionError::Aborted(_))));
    assert_eq!(connection.pending_call_count(), 0);
    assert!(!service.is_connected());
    assert_eq!(
        events.try_recv().unwrap(),
        ConnectionEvent::DeviceDisconnected(ROOT_UUID.to_string())
    );
    // Only once
    connection.disconnect(false);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_releases_pending_call() {
    let transport = MockTransport::with_renderer();
    transport.route("POST", RC_CONTROL_URL, Route::Hang);
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let action = connection
        .device()
        .find_service(RC_URN)
        .unwrap()
        .action("GetVolume")
        .unwrap();

    let call = tokio::spawn(async move { action.invoke(vec![StateValue::UI4(0)]).await });
    wait_for(|| (connection.pending_call_count() == 1).then_some(())).await;

    call.abort();
    assert!(call.await.unwrap_err().is_cancelled());
    assert_eq!(connection.pending_call_count(), 0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connection.pending_call_count(), 0);
    assert!(connection.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_short_granted_timeout_does_not_renew_immediately() {
    let transport = MockTransport::with_renderer();
    transport.route(
        "SUBSCRIBE",
        RC_EVENT_URL,
        Route::Respond(
            HttpResponse::new(200)
                .with_header("SID", "uuid:sub-0")
                .with_header("TIMEOUT", "Second-0"),
        ),
    );
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let service = connection.device().find_service(RC_URN).unwrap();
    service.subscribe_state_variables().await.unwrap();

    let renewals = || {
        transport
            .requests_to("SUBSCRIBE", RC_EVENT_URL)
            .into_iter()
            .filter(|r| r.header_value("SID") == Some("uuid:sub-0"))
            .count()
    };

    // Second-0 is raised to twice the 30 s renewal gap
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(renewals(), 0);
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(renewals(), 1);
    assert!(connection.is_subscribed(&service));
}

#[tokio::test(start_paused = true)]
async fn test_subscription_lifecycle() {
    let transport = MockTransport::with_renderer();
    transport.route(
        "SUBSCRIBE",
        RC_EVENT_URL,
        Route::Respond(
            HttpResponse::new(200)
                .with_header("SID", "uuid:sub-1")
                .with_header("TIMEOUT", "Second-100"),
        ),
    );
    transport.route("UNSUBSCRIBE", RC_EVENT_URL, Route::Respond(HttpResponse::new(200)));
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let service = connection.device().find_service(RC_URN).unwrap();

    service.subscribe_state_variables().await.unwrap();
    assert!(connection.is_subscribed(&service));
    assert!(matches!(
        service.subscribe_state_variables().await,
        Err(ConnectionError::AlreadySubscribed(_))
    ));

    let subscribe = transport.requests_to("SUBSCRIBE", RC_EVENT_URL).remove(0);
    assert_eq!(subscribe.header_value("NT"), Some("upnp:event"));
    assert_eq!(subscribe.header_value("TIMEOUT"), Some("Second-1800"));
    let callback = subscribe.header_value("CALLBACK").unwrap();
    assert!(callback.starts_with("<http://10.0.0.1:"));
    assert!(callback.ends_with(&format!("{}>", connection.notification_path())));

    // Renewed 30 s before the 100 s expiry
    tokio::time::sleep(Duration::from_secs(75)).await;
    let renewals: Vec<_> = transport
        .requests_to("SUBSCRIBE", RC_EVENT_URL)
        .into_iter()
        .filter(|r| r.header_value("SID") == Some("uuid:sub-1"))
        .collect();
    assert_eq!(renewals.len(), 1);
    assert!(renewals[0].header_value("CALLBACK").is_none());

    service.unsubscribe_state_variables().await.unwrap();
    assert!(!connection.is_subscribed(&service));
    assert!(matches!(
        service.unsubscribe_state_variables().await,
        Err(ConnectionError::NotSubscribed(_))
    ));
    wait_for(|| {
        (!transport.requests_to("UNSUBSCRIBE", RC_EVENT_URL).is_empty()).then_some(())
    })
    .await;
}

#[tokio::test]
async fn test_subscription_failure_raises_event() {
    let transport = MockTransport::with_renderer();
    let (tracker, rd) = ready_root(transport.clone()).await;
    let connection = connect(&tracker, rd);
    let service = connection.device().find_service(RC_URN).unwrap();
    let events = service.events().subscribe();

    assert!(matches!(
        service.subscribe_state_variables().await,
        Err(ConnectionError::Subscription { .. })
    ));
    assert!(matches!(
        events.try_recv(),
        Ok(ServiceEvent::SubscriptionFailed(_))
    ));
    assert!(!connection.is_subscribed(&service));
}
