//! Step grid: one row per track, the sounding step highlighted

use egui::{Color32, Rect, Sense, Stroke, Ui, Vec2};
use stepcode_core::{is_valid_token, PatternSet, StepToken, TrackId, WrapPolicy};

const LABEL_WIDTH: f32 = 56.0;
const ROW_HEIGHT: f32 = 28.0;
const MAX_CELL_WIDTH: f32 = 48.0;

pub struct StepGridPanel {
    policy: WrapPolicy,
}

impl StepGridPanel {
    pub fn new(policy: WrapPolicy) -> Self {
        Self { policy }
    }

    pub fn ui(&mut self, ui: &mut Ui, patterns: &PatternSet, current_step: Option<usize>) {
        let cycle = patterns.cycle_length();
        if cycle == 0 {
            ui.centered_and_justified(|ui| {
                ui.label("Type a pattern, e.g. `drums: kick - snare -`");
            });
            return;
        }

        let width = ui.available_width();
        let cell_width = ((width - LABEL_WIDTH) / cycle as f32).clamp(8.0, MAX_CELL_WIDTH);
        let height = ROW_HEIGHT * patterns.len() as f32;
        let (response, painter) = ui.allocate_painter(
            Vec2::new(LABEL_WIDTH + cell_width * cycle as f32, height),
            Sense::hover(),
        );
        let origin = response.rect.min;

        for (row, (track, pattern)) in patterns.iter().enumerate() {
            let top = origin.y + row as f32 * ROW_HEIGHT;
            painter.text(
                egui::pos2(origin.x, top + ROW_HEIGHT / 2.0),
                egui::Align2::LEFT_CENTER,
                track.name(),
                egui::FontId::monospace(12.0),
                Color32::from_gray(190),
            );

            for step in 0..cycle {
                let cell = Rect::from_min_size(
                    egui::pos2(origin.x + LABEL_WIDTH + step as f32 * cell_width, top + 2.0),
                    Vec2::new(cell_width - 2.0, ROW_HEIGHT - 4.0),
                );
                let token = pattern.token_at(step, self.policy);
                painter.rect_filled(cell, 3.0, Self::cell_color(track, token));

                if current_step == Some(step) {
                    painter.rect_stroke(cell, 3.0, Stroke::new(2.0, Color32::WHITE), egui::StrokeKind::Outside);
                }

                if let Some(StepToken::Play(text)) = token {
                    if cell_width >= 24.0 {
                        painter.text(
                            cell.center(),
                            egui::Align2::CENTER_CENTER,
                            Self::short_label(text),
                            egui::FontId::proportional(10.0),
                            Color32::WHITE,
                        );
                    }
                }
            }
        }
    }

    fn cell_color(track: TrackId, token: Option<&StepToken>) -> Color32 {
        match token {
            None => Color32::from_gray(22),
            Some(StepToken::Rest) => Color32::from_gray(38),
            Some(StepToken::Play(text)) if !is_valid_token(text, track) => Color32::from_rgb(120, 50, 50),
            Some(StepToken::Play(_)) => match track {
                TrackId::Drums => Color32::from_rgb(70, 110, 160),
                TrackId::Bass => Color32::from_rgb(70, 140, 90),
                TrackId::Synth => Color32::from_rgb(140, 90, 150),
            },
        }
    }

    fn short_label(token: &str) -> &str {
        match token {
            "openhat" => "oh",
            "hihat" => "hh",
            "cowbell" => "cb",
            "crash" => "cr",
            _ => token.get(..4).unwrap_or(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_distinguish_rest_and_invalid() {
        let rest = StepGridPanel::cell_color(TrackId::Drums, Some(&StepToken::Rest));
        let past_end = StepGridPanel::cell_color(TrackId::Drums, None);
        let kick = StepGridPanel::cell_color(TrackId::Drums, Some(&StepToken::parse("kick")));
        let banana = StepGridPanel::cell_color(TrackId::Drums, Some(&StepToken::parse("banana")));
        assert_ne!(rest, past_end);
        assert_ne!(kick, banana);
        assert_ne!(rest, kick);
    }

    #[test]
    fn test_short_labels() {
        assert_eq!(StepGridPanel::short_label("hihat"), "hh");
        assert_eq!(StepGridPanel::short_label("snare"), "snar");
        assert_eq!(StepGridPanel::short_label("C#4"), "C#4");
    }
}
