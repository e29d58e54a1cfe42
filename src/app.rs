use eframe::egui;

use crate::state::{AppState, ViewMode};
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct McsApp {
    pub state: AppState,
}

impl McsApp {
    /// Start the viewer, loading the initial window when one was given.
    pub fn new(state: AppState, load_on_start: bool) -> Self {
        let mut app = Self { state };
        if load_on_start {
            app.state.load_selected();
        }
        app
    }
}

impl eframe::App for McsApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: window and display controls ----
        egui::SidePanel::left("control_panel")
            .default_width(240.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        egui::CentralPanel::default().show(ctx, |ui| match self.state.view {
            ViewMode::Radiance => plot::radiance_plot(ui, &self.state),
            ViewMode::Profiles => plot::profile_plot(ui, &self.state),
        });
    }
}
