use alerta_core::app::ApiAlert;
use alerta_core::certificate::RescueForm;
use alerta_core::model::{AlertId, BlobRef, CaseStatus, SessionUser, ToastKind, UserId};
use alerta_core::{App, Effect, ErrorKind, Event, Model};
use crux_core::testing::AppTester;
use crux_http::testing::ResponseBuilder;

fn signed_in_model_with_case() -> Model {
    let mut model = Model::default();
    model.user = Some(SessionUser {
        id: UserId("rescuer@example.com".into()),
        email: "rescuer@example.com".into(),
        display_name: None,
    });
    model.alerts.push(open_api_alert().into_domain().unwrap());
    model
}

fn open_api_alert() -> ApiAlert {
    ApiAlert {
        id: "case-abcdefg1234567".into(),
        lat: -12.0520,
        lon: -77.0310,
        species: "dog".into(),
        condition: "injured".into(),
        description: "Limping near the market".into(),
        address: Some("Av. Arequipa 1234".into()),
        photo_url: None,
        status: "open".into(),
        reporter: "reporter@example.com".into(),
        created_at_ms: 1_700_000_000_000,
        resolved_by: None,
        resolved_at_ms: None,
        certificate_path: None,
    }
}

fn resolved_api_alert() -> ApiAlert {
    ApiAlert {
        status: "resolved".into(),
        resolved_by: Some("rescuer@example.com".into()),
        resolved_at_ms: Some(1_700_000_100_000),
        certificate_path: Some(
            "certificates/case-abcdefg1234567/Rescate_1234567_1700000100000.pdf".into(),
        ),
        ..open_api_alert()
    }
}

fn complete_form() -> RescueForm {
    RescueForm {
        rescuer_name: "Ana Torres".into(),
        national_id: "45678901".into(),
        phone: "+51987654321".into(),
        address: "Av. Arequipa 1234, Lima".into(),
        notes: None,
        signature: Some(BlobRef::new("signatures/rescuer@example.com/sig.png")),
    }
}

#[test]
fn resolve_round_trip_sets_resolution_once() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model_with_case();
    let alert_id = AlertId("case-abcdefg1234567".into());

    let update = app.update(
        Event::ResolveSubmitted {
            alert_id: alert_id.clone(),
            form: Box::new(complete_form()),
        },
        &mut model,
    );
    assert!(model.is_loading);
    assert_eq!(model.in_flight.len(), 1);
    assert!(update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    // Nothing changes until the server confirms.
    assert_eq!(model.alerts[0].status, CaseStatus::Open);

    let op_id = model.in_flight.pending_ids().pop().unwrap();
    let response = ResponseBuilder::ok().body(resolved_api_alert()).build();
    let _ = app.update(
        Event::ResolveResponded {
            op_id,
            response: Box::new(Ok(response)),
        },
        &mut model,
    );

    let case = model.alerts[0].clone();
    assert_eq!(case.status, CaseStatus::Resolved);
    let resolution = case.resolution.expect("resolver and timestamp set together");
    assert_eq!(resolution.resolver, UserId("rescuer@example.com".into()));
    assert_eq!(resolution.resolved_at.0, 1_700_000_100_000);
    assert!(resolution.certificate.uri.starts_with("certificates/case-abcdefg1234567/"));
    let toast = model.active_toast.clone().expect("expected success toast");
    assert_eq!(toast.kind, ToastKind::Success);

    // A second attempt is refused locally; resolution is irreversible.
    let update = app.update(
        Event::ResolveSubmitted {
            alert_id,
            form: Box::new(complete_form()),
        },
        &mut model,
    );
    assert!(model.in_flight.is_empty());
    assert!(!update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    assert_eq!(model.alerts[0].status, CaseStatus::Resolved);
}

#[test]
fn failed_resolve_leaves_the_case_open() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model_with_case();

    let _ = app.update(
        Event::ResolveSubmitted {
            alert_id: AlertId("case-abcdefg1234567".into()),
            form: Box::new(complete_form()),
        },
        &mut model,
    );
    let op_id = model.in_flight.pending_ids().pop().unwrap();

    let _ = app.update(
        Event::ResolveResponded {
            op_id,
            response: Box::new(Err(crux_http::Error::Timeout)),
        },
        &mut model,
    );

    assert_eq!(model.alerts[0].status, CaseStatus::Open);
    assert!(model.alerts[0].resolution.is_none());
    assert!(model.active_error.is_some());
}

#[test]
fn invalid_form_never_reaches_the_network() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model_with_case();

    let mut form = complete_form();
    form.signature = None;
    let update = app.update(
        Event::ResolveSubmitted {
            alert_id: AlertId("case-abcdefg1234567".into()),
            form: Box::new(form),
        },
        &mut model,
    );

    assert!(model.in_flight.is_empty());
    assert!(!update.effects.iter().any(|e| matches!(e, Effect::Http(_))));
    let error = model.active_error.clone().expect("expected validation error");
    assert_eq!(error.kind, ErrorKind::Validation);
    assert_eq!(model.alerts[0].status, CaseStatus::Open);
}

#[test]
fn resolving_an_unknown_case_errors() {
    let app = AppTester::<App, Effect>::default();
    let mut model = signed_in_model_with_case();

    let _ = app.update(
        Event::ResolveSubmitted {
            alert_id: AlertId("case-missing".into()),
            form: Box::new(complete_form()),
        },
        &mut model,
    );
    let error = model.active_error.clone().expect("expected not-found error");
    assert_eq!(error.kind, ErrorKind::NotFound);
}
