use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::ExitCode;
use std::rc::Rc;

use debug_menu::{
    BlobStore, CommandScope, DebugMenuSession, DebugMenuSettings, FileBlobStore, FocusCandidate,
    InputBindings, LoadOutcome, PropertyValue, SaveError, SessionCollaborators, MENU_CONTEXT,
};
use tracing::{error, info, warn};
use winit::keyboard::KeyCode;

use super::bootstrap::AppWiring;
use super::world::{
    build_world, DemoWorld, LoggingExecutor, LoopbackTransport, MenuRow, RowIntent, PLAYER_KEY,
};

const FIXED_DT_SECONDS: f32 = 1.0 / 60.0;
const HOST_DAMAGE_FRAME: u32 = 30;

/// Frame, key, pressed.
const SCRIPT: &[(u32, KeyCode, bool)] = &[
    (5, KeyCode::F1, true),
    (8, KeyCode::F1, false),
    (20, KeyCode::ArrowDown, true),
    (52, KeyCode::ArrowDown, false),
    (70, KeyCode::Enter, true),
    (72, KeyCode::Enter, false),
    (80, KeyCode::ArrowUp, true),
    (82, KeyCode::ArrowUp, false),
    (84, KeyCode::Enter, true),
    (86, KeyCode::Enter, false),
    (100, KeyCode::F1, true),
    (102, KeyCode::F1, false),
];

#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct RunSummary {
    pub(crate) frames: u32,
    pub(crate) load: Option<LoadOutcome>,
    pub(crate) property_events: u32,
    pub(crate) intents: Vec<RowIntent>,
    pub(crate) screenshots: u32,
    pub(crate) saved: bool,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let store = Box::new(FileBlobStore::new(app.settings.save_dir.clone()));
    match run_frames(app.settings, app.frames, store) {
        Ok(summary) => {
            info!(
                frames = summary.frames,
                property_events = summary.property_events,
                intents = summary.intents.len(),
                screenshots = summary.screenshots,
                saved = summary.saved,
                "demo_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "demo_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_frames(
    settings: DebugMenuSettings,
    frames: u32,
    store: Box<dyn BlobStore>,
) -> Result<RunSummary, SaveError> {
    let world = build_world();
    let mut session = DebugMenuSession::new(
        settings,
        SessionCollaborators {
            access: world.table.clone(),
            executor: Box::new(LoggingExecutor),
            transport: Box::new(LoopbackTransport::new()),
            store,
        },
    );
    let mut summary = RunSummary {
        load: Some(session.load()?),
        ..RunSummary::default()
    };

    for (property, key) in [
        ("Health", Some(PLAYER_KEY)),
        ("MoveSpeed", Some(PLAYER_KEY)),
        ("GodMode", Some(PLAYER_KEY)),
        ("Location", None),
    ] {
        if let Err(err) = session.watch_property(world.player, property, key) {
            warn!(property, error = %err, "demo_watch_failed");
        }
    }

    let property_events = Rc::new(RefCell::new(0u32));
    let counter = Rc::clone(&property_events);
    session.bus().int_changed().subscribe(move |event| {
        info!(
            object = %event.owner,
            property = event.property_name.as_str(),
            old = event.old_value,
            new = event.new_value,
            "watched_int_changed"
        );
        *counter.borrow_mut() += 1;
    });
    let counter = Rc::clone(&property_events);
    session.bus().bool_changed().subscribe(move |event| {
        info!(property = event.property_name.as_str(), new = event.new_value, "watched_bool_changed");
        *counter.borrow_mut() += 1;
    });

    let captures = Rc::new(RefCell::new(Vec::new()));
    let pending = Rc::clone(&captures);
    session
        .bus()
        .screenshot_requested()
        .subscribe(move |event| pending.borrow_mut().push(event.request_id));

    let intents = Rc::new(RefCell::new(VecDeque::new()));
    let rows: Vec<Rc<dyn FocusCandidate>> = vec![
        Rc::new(MenuRow::new("Heal", RowIntent::Heal, &intents)),
        Rc::new(MenuRow::new("God mode", RowIntent::ToggleGodMode, &intents)),
        Rc::new(MenuRow::new("Save", RowIntent::SaveNow, &intents)),
        Rc::new(MenuRow::new("Respawn", RowIntent::Respawn, &intents)),
    ];
    for row in &rows {
        session.arbiter_mut().register_candidate(MENU_CONTEXT, row);
    }

    for command in ["stat fps", "god"] {
        if let Err(err) = session.execute_command(command, CommandScope::LocalOnly) {
            warn!(command, error = %err, "demo_command_failed");
        }
    }
    if let Err(err) = session.execute_command("slomo 0.5", CommandScope::ServerAll) {
        warn!(error = %err, "demo_command_failed");
    }

    let mut bindings = InputBindings::default();
    for frame in 0..frames {
        for (_, key, pressed) in SCRIPT.iter().filter(|(at, _, _)| *at == frame) {
            bindings.handle_key_code(*key, *pressed);
        }
        if frame == HOST_DAMAGE_FRAME {
            world
                .table
                .set_from_host(world.player, "Health", PropertyValue::Int(60));
        }

        session.tick(FIXED_DT_SECONDS, 1.0, &bindings.snapshot());

        for request_id in captures.borrow_mut().drain(..) {
            session.finish_screenshot(request_id, true);
            summary.screenshots += 1;
        }

        let queued: Vec<RowIntent> = intents.borrow_mut().drain(..).collect();
        for intent in queued {
            apply_intent(&mut session, &world, intent)?;
            summary.intents.push(intent);
        }
        summary.frames += 1;
    }

    summary.saved = session.save()?;
    summary.property_events = *property_events.borrow();
    session.teardown();
    Ok(summary)
}

fn apply_intent(
    session: &mut DebugMenuSession,
    world: &DemoWorld,
    intent: RowIntent,
) -> Result<(), SaveError> {
    let edit = match intent {
        RowIntent::Heal => session.edit_property(world.player, "Health", PropertyValue::Int(100)),
        RowIntent::ToggleGodMode => {
            let enabled = matches!(
                session.registry().cached_value(world.player, "GodMode"),
                Some(PropertyValue::Bool(true))
            );
            session.edit_property(world.player, "GodMode", PropertyValue::Bool(!enabled))
        }
        RowIntent::Respawn => {
            if let Err(err) = session.execute_function(world.player, "Respawn") {
                warn!(error = %err, "demo_function_failed");
            }
            return Ok(());
        }
        RowIntent::SaveNow => {
            session.save()?;
            return Ok(());
        }
    };
    if let Err(err) = edit {
        warn!(?intent, error = %err, "demo_edit_failed");
    }
    Ok(())
}
