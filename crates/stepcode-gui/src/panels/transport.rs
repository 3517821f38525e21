//! Transport controls with tempo, volume and output meter

use std::sync::Arc;

use egui::{Color32, Rect, RichText, Sense, Stroke, Ui, Vec2};
use stepcode_core::{Tempo, TransportStatus};
use stepcode_services::{EngineState, MAX_VOLUME_DB, MIN_VOLUME_DB};

/// Actions that can be triggered from transport
pub enum TransportAction {
    None,
    Start,
    Pause,
    Resume,
    Stop,
    SetTempo(f64),
    SetVolume(f64),
}

pub struct TransportPanel {
    bpm: f64,
    volume_db: f64,
    display_peak: f32,
}

impl TransportPanel {
    pub fn new(bpm: f64, volume_db: f64) -> Self {
        Self {
            bpm: Tempo::new(bpm).bpm(),
            volume_db: volume_db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB),
            display_peak: 0.0,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Action for the play/pause toggle in the given state
    pub fn toggle_action(status: TransportStatus) -> TransportAction {
        match status {
            TransportStatus::Playing => TransportAction::Pause,
            TransportStatus::Paused => TransportAction::Resume,
            TransportStatus::Stopped => TransportAction::Start,
            TransportStatus::WaitingForAudio => TransportAction::None,
        }
    }

    pub fn ui(
        &mut self,
        ui: &mut Ui,
        status: TransportStatus,
        current_step: Option<usize>,
        engine_state: Option<&Arc<EngineState>>,
    ) -> TransportAction {
        let mut action = TransportAction::None;

        ui.horizontal(|ui| {
            ui.spacing_mut().item_spacing.x = 8.0;

            let play_text = if status == TransportStatus::Playing { "\u{23F8}" } else { "\u{25B6}" };
            let play_btn = ui.add_enabled(
                status != TransportStatus::WaitingForAudio,
                egui::Button::new(RichText::new(play_text).size(20.0)),
            );
            if play_btn.clicked() {
                action = Self::toggle_action(status);
            }
            play_btn.on_hover_text("Play / pause (space)");

            if ui.button(RichText::new("\u{23F9}").size(20.0)).clicked() {
                action = TransportAction::Stop;
            }

            ui.separator();

            ui.label("BPM:");
            let bpm_response = ui.add(
                egui::DragValue::new(&mut self.bpm)
                    .range(Tempo::MIN..=Tempo::MAX)
                    .speed(0.5)
                    .fixed_decimals(0),
            );
            if bpm_response.changed() {
                action = TransportAction::SetTempo(self.bpm);
            }

            ui.separator();

            ui.label("Vol:");
            let volume_response = ui.add(
                egui::Slider::new(&mut self.volume_db, MIN_VOLUME_DB..=MAX_VOLUME_DB)
                    .suffix(" dB")
                    .fixed_decimals(0),
            );
            if volume_response.changed() {
                action = TransportAction::SetVolume(self.volume_db);
            }

            if let Some(state) = engine_state {
                self.draw_meter(ui, state, status == TransportStatus::Playing);
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let (label, color) = match status {
                    TransportStatus::Playing => ("Playing", Color32::from_rgb(100, 200, 100)),
                    TransportStatus::Paused => ("Paused", Color32::from_rgb(200, 170, 80)),
                    TransportStatus::Stopped => ("Stopped", Color32::from_gray(160)),
                    TransportStatus::WaitingForAudio => ("Starting audio...", Color32::from_rgb(120, 160, 220)),
                };
                ui.label(RichText::new(label).color(color));
                if let Some(step) = current_step {
                    ui.monospace(format!("step {:>2}", step + 1));
                }
            });
        });

        action
    }

    fn draw_meter(&mut self, ui: &mut Ui, state: &Arc<EngineState>, playing: bool) {
        let smoothing = 0.3;
        self.display_peak = self.display_peak * (1.0 - smoothing) + state.peak() * smoothing;
        if !playing {
            self.display_peak *= 0.9;
        }

        let meter_width = 120.0;
        let meter_height = 14.0;
        let (response, painter) = ui.allocate_painter(
            Vec2::new(meter_width + 2.0, meter_height + 2.0),
            Sense::hover(),
        );
        let meter_rect = Rect::from_min_size(
            response.rect.min + Vec2::new(1.0, 1.0),
            Vec2::new(meter_width, meter_height),
        );

        painter.rect_filled(meter_rect, 2.0, Color32::from_gray(25));

        let peak_db = Self::linear_to_db(self.display_peak);
        let width = Self::db_to_width(peak_db, meter_rect.width());
        if width > 0.0 {
            let color = if peak_db > -6.0 {
                Color32::from_rgb(180, 50, 50)
            } else if peak_db > -12.0 {
                Color32::from_rgb(180, 160, 50)
            } else {
                Color32::from_rgb(50, 160, 50)
            };
            painter.rect_filled(
                Rect::from_min_size(meter_rect.min, Vec2::new(width, meter_height)),
                2.0,
                color,
            );
        }

        painter.rect_stroke(meter_rect, 2.0, Stroke::new(1.0, Color32::from_gray(50)), egui::StrokeKind::Outside);
    }

    fn linear_to_db(linear: f32) -> f32 {
        if linear < 0.00001 {
            return -60.0;
        }
        20.0 * linear.log10()
    }

    fn db_to_width(db: f32, max_width: f32) -> f32 {
        let normalized = (db + 60.0) / 60.0;
        normalized.clamp(0.0, 1.0) * max_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_follows_status() {
        assert!(matches!(TransportPanel::toggle_action(TransportStatus::Stopped), TransportAction::Start));
        assert!(matches!(TransportPanel::toggle_action(TransportStatus::Playing), TransportAction::Pause));
        assert!(matches!(TransportPanel::toggle_action(TransportStatus::Paused), TransportAction::Resume));
        assert!(matches!(
            TransportPanel::toggle_action(TransportStatus::WaitingForAudio),
            TransportAction::None
        ));
    }

    #[test]
    fn test_initial_values_are_clamped() {
        let panel = TransportPanel::new(300.0, 6.0);
        assert_eq!(panel.bpm(), 200.0);
        assert_eq!(panel.volume_db, 0.0);
    }

    #[test]
    fn test_meter_scale() {
        assert_eq!(TransportPanel::db_to_width(0.0, 120.0), 120.0);
        assert_eq!(TransportPanel::db_to_width(-60.0, 120.0), 0.0);
        assert_eq!(TransportPanel::linear_to_db(0.0), -60.0);
    }
}
