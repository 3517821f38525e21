//! Main application state

use std::sync::Arc;
use std::time::Duration;

use eframe::CreationContext;
use egui::{Color32, Context, RichText};
use stepcode_core::{DisplayEvent, PatternSet, StepcodeError, TransportStatus, compile};
use stepcode_services::{ControlCommand, LiveSession, SessionEvent};
use tracing::{info, warn};

use crate::config::{AppConfig, load_config, save_config};
use crate::panels::{EditorAction, EditorPanel, StepGridPanel, TransportAction, TransportPanel};

pub struct StepcodeApp {
    config: AppConfig,
    session: Option<LiveSession>,

    // Panels
    transport_panel: TransportPanel,
    editor_panel: EditorPanel,
    step_grid_panel: StepGridPanel,

    // Latest state reported by the session
    status: TransportStatus,
    current_step: Option<usize>,
    patterns: Arc<PatternSet>,
    message: Option<String>,
}

impl StepcodeApp {
    pub fn new(_cc: &CreationContext<'_>) -> Self {
        let config = load_config();
        let editor_panel = EditorPanel::default();

        let session = match LiveSession::spawn(config.sequencer.clone(), config.audio.volume_db) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Failed to start session: {}", e);
                None
            }
        };

        let mut app = Self {
            transport_panel: TransportPanel::new(config.tempo, config.audio.volume_db),
            step_grid_panel: StepGridPanel::new(config.sequencer.wrap_policy),
            patterns: Arc::new(compile(editor_panel.text())),
            editor_panel,
            session,
            config,
            status: TransportStatus::Stopped,
            current_step: None,
            message: None,
        };

        app.send(ControlCommand::SetTempo(app.transport_panel.bpm()));
        app.send(ControlCommand::SubmitText(app.editor_panel.text().to_string()));
        if app.session.is_none() {
            app.message = Some("Sequencer unavailable".into());
        }
        app
    }

    fn send(&mut self, command: ControlCommand) {
        let Some(session) = &self.session else { return };
        if let Err(e) = session.send(command) {
            warn!("Session command failed: {}", e);
            self.message = Some(e.to_string());
        }
    }

    fn handle_transport_action(&mut self, action: TransportAction) {
        let command = match action {
            TransportAction::None => return,
            TransportAction::Start => ControlCommand::Start,
            TransportAction::Pause => ControlCommand::Pause,
            TransportAction::Resume => ControlCommand::Resume,
            TransportAction::Stop => ControlCommand::Stop,
            TransportAction::SetTempo(bpm) => {
                self.config.tempo = bpm;
                ControlCommand::SetTempo(bpm)
            }
            TransportAction::SetVolume(db) => {
                self.config.audio.volume_db = db;
                ControlCommand::SetVolume(db)
            }
        };
        if matches!(command, ControlCommand::Start | ControlCommand::Resume) {
            self.message = None;
        }
        self.send(command);
    }

    fn drain_events(&mut self) {
        let Some(session) = &self.session else { return };
        let events: Vec<SessionEvent> = session.events().collect();

        for event in events {
            match event {
                SessionEvent::Display(DisplayEvent::StepAdvance { step, patterns }) => {
                    self.current_step = Some(step);
                    self.patterns = patterns;
                }
                SessionEvent::Display(DisplayEvent::PatternSetChanged(patterns)) => {
                    // While playing the grid follows the sounding snapshot
                    if self.status != TransportStatus::Playing {
                        self.patterns = patterns;
                    }
                }
                SessionEvent::Display(DisplayEvent::TransportStatus(status)) => {
                    self.status = status;
                    if status == TransportStatus::Stopped {
                        self.current_step = None;
                    }
                }
                SessionEvent::Rejected(e) => {
                    self.message = Some(match e {
                        StepcodeError::NothingToPlay => "Nothing to play: add a track line".into(),
                        other => other.to_string(),
                    });
                }
            }
        }
    }
}

impl eframe::App for StepcodeApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        // Ctrl+Space toggles playback; plain space belongs to the editor
        if ctx.input(|i| i.modifiers.command && i.key_pressed(egui::Key::Space)) {
            self.handle_transport_action(TransportPanel::toggle_action(self.status));
        }

        // 1. Transport bar
        let engine_state = self.session.as_ref().and_then(|s| s.engine_state()).cloned();
        let transport_action = egui::TopBottomPanel::top("transport").show(ctx, |ui| {
            self.transport_panel.ui(ui, self.status, self.current_step, engine_state.as_ref())
        }).inner;
        self.handle_transport_action(transport_action);

        // 2. Step grid
        egui::TopBottomPanel::bottom("step_grid")
            .resizable(false)
            .min_height(100.0)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                self.step_grid_panel.ui(ui, &self.patterns, self.current_step);
                if let Some(message) = &self.message {
                    ui.label(RichText::new(message).color(Color32::from_rgb(220, 120, 100)));
                }
            });

        // 3. Editor
        let editor_action = egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| self.editor_panel.ui(ui)).inner
        }).inner;

        if let EditorAction::Changed(text) = editor_action {
            self.send(ControlCommand::SubmitText(text));
        }

        if self.status == TransportStatus::Playing {
            ctx.request_repaint();
        } else {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        save_config(&self.config);
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
        info!("Session closed");
    }
}
