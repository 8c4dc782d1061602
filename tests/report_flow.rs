use alerta_core::app::ApiAlert;
use alerta_core::capabilities::{LocationOutput, NotifyOutput};
use alerta_core::model::{AlertId, Condition, SessionUser, Species, ToastKind, UnixTimeMs, UserId};
use alerta_core::notify::NotificationPrefs;
use alerta_core::{App, Effect, ErrorKind, Event, Model};
use crux_core::testing::AppTester;
use crux_http::testing::ResponseBuilder;

fn sign_in(app: &AppTester<App, Effect>, model: &mut Model) {
    let _ = app.update(
        Event::SignedIn {
            user: SessionUser {
                id: UserId("me@example.com".into()),
                email: "me@example.com".into(),
                display_name: Some("Me".into()),
            },
            token: "session-token".into(),
        },
        model,
    );
}

fn set_position(app: &AppTester<App, Effect>, model: &mut Model) {
    let _ = app.update(
        Event::PositionUpdated(LocationOutput::Position {
            lat: -12.0500,
            lon: -77.0300,
        }),
        model,
    );
}

fn api_alert(id: &str, species: &str, lat: f64, lon: f64, reporter: &str) -> ApiAlert {
    ApiAlert {
        id: id.into(),
        lat,
        lon,
        species: species.into(),
        condition: "injured".into(),
        description: "Needs help near the market".into(),
        address: None,
        photo_url: None,
        status: "open".into(),
        reporter: reporter.into(),
        created_at_ms: 1_700_000_000_000,
        resolved_by: None,
        resolved_at_ms: None,
        certificate_path: None,
    }
}

#[test]
fn report_submission_round_trip() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    sign_in(&app, &mut model);
    set_position(&app, &mut model);

    let _ = app.update(Event::DraftOpened, &mut model);
    let mut draft = model.draft.clone().expect("draft should be open");
    assert!(draft.position.is_some(), "draft inherits the current position");
    draft.species = Some(Species::Dog);
    draft.condition = Some(Condition::Injured);
    draft.description = "Limping dog by the market entrance".into();
    let _ = app.update(Event::DraftChanged(Box::new(draft)), &mut model);

    let update = app.update(Event::ReportSubmitted, &mut model);
    assert!(model.is_loading);
    assert_eq!(model.in_flight.len(), 1);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));

    let op_id = model.in_flight.pending_ids().pop().unwrap();
    let response = ResponseBuilder::ok()
        .body(api_alert("case-new", "dog", -12.0500, -77.0300, "me@example.com"))
        .build();
    let _ = app.update(
        Event::ReportResponded {
            op_id,
            response: Box::new(Ok(response)),
        },
        &mut model,
    );

    assert!(!model.is_loading);
    assert!(model.draft.is_none(), "draft is cleared after publish");
    assert_eq!(model.alerts.len(), 1);
    assert_eq!(model.alerts[0].id, AlertId("case-new".into()));
    let toast = model.active_toast.clone().expect("expected success toast");
    assert_eq!(toast.kind, ToastKind::Success);
}

#[test]
fn timed_out_submission_drops_the_late_response() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    sign_in(&app, &mut model);
    set_position(&app, &mut model);

    let _ = app.update(Event::DraftOpened, &mut model);
    let mut draft = model.draft.clone().unwrap();
    draft.species = Some(Species::Cat);
    draft.condition = Some(Condition::Lost);
    draft.description = "White cat, red collar".into();
    let _ = app.update(Event::DraftChanged(Box::new(draft)), &mut model);
    let _ = app.update(Event::ReportSubmitted, &mut model);

    let op_id = model.in_flight.pending_ids().pop().unwrap();

    // The 15 second budget passes before any response arrives.
    let _ = app.update(
        Event::TimerTicked {
            now: UnixTimeMs(u64::MAX / 2),
        },
        &mut model,
    );
    assert!(model.in_flight.is_empty());
    let error = model.active_error.clone().expect("expected timeout error");
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert!(model.draft.is_some(), "draft survives so the user can retry");

    // The backend finally answers; the success must not be applied.
    let response = ResponseBuilder::ok()
        .body(api_alert("case-late", "cat", -12.0500, -77.0300, "me@example.com"))
        .build();
    let _ = app.update(
        Event::ReportResponded {
            op_id,
            response: Box::new(Ok(response)),
        },
        &mut model,
    );
    assert!(model.alerts.is_empty(), "late success is dropped, not applied");
    assert!(model.draft.is_some());
}

#[test]
fn nearby_alerts_notify_once_respecting_prefs() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    sign_in(&app, &mut model);
    set_position(&app, &mut model);
    let _ = app.update(Event::ChannelEnsured(NotifyOutput::ChannelReady), &mut model);

    let prefs = NotificationPrefs {
        dog: false,
        ..NotificationPrefs::default()
    };
    let _ = app.update(Event::PrefsChanged(Box::new(prefs)), &mut model);

    let body = vec![
        // ~0.23 km away, dog opted out
        api_alert("dog-near", "dog", -12.0520, -77.0310, "other@example.com"),
        // ~0.23 km away, cat allowed
        api_alert("cat-near", "cat", -12.0520, -77.0310, "other@example.com"),
        // ~8.4 km away, out of range
        api_alert("cat-far", "cat", -12.1000, -77.1000, "other@example.com"),
        // nearby but it is the user's own report
        api_alert("mine", "cat", -12.0501, -77.0301, "me@example.com"),
    ];

    let response = ResponseBuilder::ok().body(body.clone()).build();
    let update = app.update(Event::AlertsFetched(Box::new(Ok(response))), &mut model);
    let fired = update
        .effects
        .iter()
        .filter(|e| matches!(e, Effect::Notify(_)))
        .count();
    assert_eq!(fired, 1, "only the nearby cat should notify");

    // The same feed again: everything was already considered this session.
    let response = ResponseBuilder::ok().body(body).build();
    let update = app.update(Event::AlertsFetched(Box::new(Ok(response))), &mut model);
    let fired = update
        .effects
        .iter()
        .filter(|e| matches!(e, Effect::Notify(_)))
        .count();
    assert_eq!(fired, 0);
}

#[test]
fn deep_link_to_unfetched_case_selects_after_refresh() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    sign_in(&app, &mut model);

    let update = app.update(
        Event::DeepLinkOpened("alertamascota://alert/case-7".into()),
        &mut model,
    );
    assert!(model.selected_alert_id.is_none());
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));

    let response = ResponseBuilder::ok()
        .body(vec![api_alert(
            "case-7",
            "dog",
            -12.0520,
            -77.0310,
            "other@example.com",
        )])
        .build();
    let _ = app.update(Event::AlertsFetched(Box::new(Ok(response))), &mut model);
    assert_eq!(model.selected_alert_id, Some(AlertId("case-7".into())));
}

#[test]
fn feed_view_filters_and_sorts_by_distance() {
    let app = AppTester::<App, Effect>::default();
    let mut model = Model::default();
    sign_in(&app, &mut model);
    set_position(&app, &mut model);

    let response = ResponseBuilder::ok()
        .body(vec![
            api_alert("far", "dog", -12.1000, -77.1000, "other@example.com"),
            api_alert("near", "dog", -12.0520, -77.0310, "other@example.com"),
            api_alert("nearest", "cat", -12.0501, -77.0301, "other@example.com"),
        ])
        .build();
    let _ = app.update(Event::AlertsFetched(Box::new(Ok(response))), &mut model);

    let view = app.view(&model);
    assert!(!view.unfiltered);
    let ids: Vec<&str> = view.alerts.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["nearest", "near"], "8.4 km case is excluded");
    assert!(view.pins_geojson.contains("FeatureCollection"));
    assert!(view.pins_geojson.contains("nearest"));
    assert!(!view.pins_geojson.contains("far"));
}
