use eframe::egui::{self, Color32, RichText, ScrollArea, Ui};
use egui_extras::DatePickerButton;

use mcs_tools::data::schema::CHANNELS;
use mcs_tools::preprocess::l2::SECTION_QUANTITIES;
use mcs_tools::time::FILE_HOURS;

use crate::state::{AppState, ViewMode, ORBIT_COLUMN, WINDOWS_PER_DAY};

// ---------------------------------------------------------------------------
// Left side panel – window selection and display controls
// ---------------------------------------------------------------------------

fn window_label(window: usize) -> String {
    format!("{:02}:00", window as u32 * FILE_HOURS)
}

/// Render the left control panel.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Window");
    ui.separator();

    ui.horizontal(|ui: &mut Ui| {
        ui.label("Date");
        ui.add(DatePickerButton::new(&mut state.date).id_salt("window_date"));
    });

    ui.horizontal(|ui: &mut Ui| {
        ui.label("Start");
        egui::ComboBox::from_id_salt("window_start")
            .selected_text(window_label(state.window))
            .show_ui(ui, |ui: &mut Ui| {
                for w in 0..WINDOWS_PER_DAY {
                    ui.selectable_value(&mut state.window, w, window_label(w));
                }
            });
    });

    ui.horizontal(|ui: &mut Ui| {
        if ui.button("◀").on_hover_text("Previous window").clicked() {
            state.step_window(false);
        }
        if ui.button("Load").clicked() {
            state.load_selected();
        }
        if ui.button("▶").on_hover_text("Next window").clicked() {
            state.step_window(true);
        }
    });
    ui.label(RichText::new(state.stamp().gds()).monospace().weak());

    ui.add_space(8.0);
    match state.view {
        ViewMode::Radiance => radiance_controls(ui, state),
        ViewMode::Profiles => {
            section_controls(ui, state);
            ui.add_space(8.0);
            orbit_filter(ui, state);
        }
    }
}

fn orbit_label(orbit: Option<i64>) -> String {
    orbit.map_or_else(|| "none".to_string(), |o| o.to_string())
}

fn section_controls(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Half orbit");
    ui.separator();

    let orbits = state.orbits();
    if orbits.is_empty() {
        ui.label("Load profiles to pick an orbit.");
        return;
    }

    let mut picked = None;
    ui.horizontal(|ui: &mut Ui| {
        ui.label("Orbit");
        egui::ComboBox::from_id_salt("section_orbit")
            .selected_text(orbit_label(state.section_orbit))
            .show_ui(ui, |ui: &mut Ui| {
                for &orbit in &orbits {
                    if ui
                        .selectable_label(state.section_orbit == Some(orbit), orbit.to_string())
                        .clicked()
                    {
                        picked = Some(orbit);
                    }
                }
            });
    });
    if let Some(orbit) = picked {
        state.load_section(orbit);
    }

    ui.horizontal(|ui: &mut Ui| {
        ui.label("Quantity");
        egui::ComboBox::from_id_salt("section_quantity")
            .selected_text(state.section_quantity.as_str())
            .show_ui(ui, |ui: &mut Ui| {
                for q in SECTION_QUANTITIES {
                    ui.selectable_value(&mut state.section_quantity, q.to_string(), q);
                }
            });
    });

    ui.horizontal(|ui: &mut Ui| {
        ui.radio_value(&mut state.section_daytime, true, "Day");
        ui.radio_value(&mut state.section_daytime, false, "Night");
    });

    if let Some(section) = &state.section {
        ui.label(format!("{} DDR2 rows", section.len()));
    }
}

fn radiance_controls(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Radiance");
    ui.separator();

    let current = state.channel.clone();
    ui.horizontal(|ui: &mut Ui| {
        ui.label("Channel");
        egui::ComboBox::from_id_salt("channel")
            .selected_text(current.as_str())
            .show_ui(ui, |ui: &mut Ui| {
                for ch in CHANNELS {
                    if ui.selectable_label(current == ch, ch).clicked() {
                        state.set_channel(ch);
                    }
                }
            });
    });

    let mut auto = state.clim.auto;
    if ui.checkbox(&mut auto, "Auto colour limits").changed() {
        state.set_auto_limits(auto);
    }
    ui.add_enabled_ui(!state.clim.auto, |ui: &mut Ui| {
        ui.horizontal(|ui: &mut Ui| {
            ui.label("Min");
            ui.add(egui::DragValue::new(&mut state.clim.min).speed(0.1));
            ui.label("Max");
            ui.add(egui::DragValue::new(&mut state.clim.max).speed(0.1));
        });
    });

    if let Some(grid) = &state.grid {
        ui.label(format!(
            "{} sequences × {} detectors",
            grid.times.len(),
            grid.detectors.len()
        ));
    }
}

fn orbit_filter(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Orbits");
    ui.separator();

    let Some(all_values) = state
        .profiles
        .as_ref()
        .and_then(|rs| rs.unique_values(ORBIT_COLUMN).ok())
    else {
        ui.label("No profiles loaded.");
        return;
    };

    let n_selected = state.filters.get(ORBIT_COLUMN).map_or(0, |s| s.len());
    ui.horizontal(|ui: &mut Ui| {
        ui.label(format!("{n_selected}/{}", all_values.len()));
        if ui.small_button("All").clicked() {
            state.select_all(ORBIT_COLUMN);
        }
        if ui.small_button("None").clicked() {
            state.select_none(ORBIT_COLUMN);
        }
    });

    let mut toggled = Vec::new();
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for val in &all_values {
                let mut checked = state
                    .filters
                    .get(ORBIT_COLUMN)
                    .is_some_and(|s| s.contains(val));

                let mut text = RichText::new(val.to_string());
                if let Some(cm) = &state.color_map {
                    text = text.color(cm.color_for(val));
                }

                if ui.checkbox(&mut checked, text).changed() {
                    toggled.push(val.clone());
                }
            }
        });

    for val in toggled {
        state.toggle_filter_value(ORBIT_COLUMN, &val);
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open L1B…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
        });

        ui.menu_button("View", |ui: &mut Ui| {
            for (mode, label) in [
                (ViewMode::Radiance, "Radiance panel"),
                (ViewMode::Profiles, "Profile locations"),
            ] {
                if ui.selectable_label(state.view == mode, label).clicked() {
                    set_view(state, mode);
                    ui.close_menu();
                }
            }
        });

        ui.separator();

        match state.view {
            ViewMode::Radiance => {
                if let Some(label) = &state.source_label {
                    ui.label(format!("{label}, channel {}", state.channel));
                }
            }
            ViewMode::Profiles => {
                if let Some(rs) = &state.profiles {
                    ui.label(format!(
                        "{} profiles loaded, {} visible",
                        rs.len(),
                        state.visible_indices.len()
                    ));
                }
            }
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

fn set_view(state: &mut AppState, mode: ViewMode) {
    if state.view == mode {
        return;
    }
    state.view = mode;
    let needs_load = match mode {
        ViewMode::Radiance => state.radiances.is_none(),
        ViewMode::Profiles => state.profiles.is_none(),
    };
    if needs_load {
        state.load_selected();
    }
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open MCS Level 1B file")
        .add_filter("Level 1B", &["L1B", "TAB"])
        .add_filter("All files", &["*"])
        .pick_file();

    if let Some(path) = file {
        state.open_file(&path);
    }
}
