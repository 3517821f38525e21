//! Pattern text editor with advisory diagnostics

use egui::{Color32, RichText, Ui};
use stepcode_core::{check, Diagnostic, DiagnosticKind};

pub const STARTER_TEXT: &str = "\
// one line per track, `-` is a rest
drums: kick - hihat - snare - hihat -
bass:  C2 - - C2 - - G1 -
synth: - E4 - G4 - - B4 -
";

/// Action returned from the editor
pub enum EditorAction {
    None,
    Changed(String),
}

pub struct EditorPanel {
    text: String,
    diagnostics: Vec<Diagnostic>,
}

impl EditorPanel {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let diagnostics = check(&text);
        Self { text, diagnostics }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn ui(&mut self, ui: &mut Ui) -> EditorAction {
        let mut action = EditorAction::None;

        let response = ui.add(
            egui::TextEdit::multiline(&mut self.text)
                .code_editor()
                .desired_rows(10)
                .desired_width(f32::INFINITY),
        );

        if response.changed() {
            self.diagnostics = check(&self.text);
            action = EditorAction::Changed(self.text.clone());
        }

        ui.add_space(4.0);
        if self.diagnostics.is_empty() {
            ui.label(RichText::new("\u{2714} ok").small().color(Color32::from_rgb(100, 180, 100)));
        }
        for diagnostic in &self.diagnostics {
            let color = match diagnostic.kind {
                DiagnosticKind::Overridden { .. } => Color32::from_gray(150),
                _ => Color32::from_rgb(220, 170, 80),
            };
            ui.label(RichText::new(diagnostic.to_string()).small().monospace().color(color));
        }

        action
    }
}

impl Default for EditorPanel {
    fn default() -> Self {
        Self::new(STARTER_TEXT)
    }
}
