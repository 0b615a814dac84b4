//! GUI rendering functions.
//!
//! Contains UI layout and component rendering logic.

use eframe::egui::{self, Color32, RichText};

use super::state::{CameraStatus, GuiState, ResultDialog};
use crate::camera::zoom::ZoomState;
use crate::facility::{facility_map_link, Platform};

/// Size of the reload button overlaid on the camera view.
pub const RELOAD_BUTTON_SIZE: egui::Vec2 = egui::vec2(112.0, 36.0);
const OVERLAY_MARGIN: f32 = 12.0;

/// Screen rect of the reload button for a camera view at `camera_rect`.
pub fn reload_button_rect(camera_rect: egui::Rect) -> egui::Rect {
    egui::Rect::from_min_size(
        egui::pos2(
            camera_rect.right() - RELOAD_BUTTON_SIZE.x - OVERLAY_MARGIN,
            camera_rect.top() + OVERLAY_MARGIN,
        ),
        RELOAD_BUTTON_SIZE,
    )
}

/// Render the placeholder shown until frames arrive.
pub fn render_camera_placeholder(ui: &mut egui::Ui, rect: egui::Rect, status: &CameraStatus) {
    ui.painter().rect_filled(rect, 0.0, Color32::from_gray(20));
    let color = match status {
        CameraStatus::Failed(_) => Color32::from_rgb(220, 80, 80),
        _ => Color32::from_gray(200),
    };
    ui.painter().text(
        rect.center(),
        egui::Align2::CENTER_CENTER,
        status.status_text(),
        egui::FontId::proportional(18.0),
        color,
    );
}

/// Render the reload button over the camera view.
/// Returns true if clicked.
pub fn render_reload_button(ui: &mut egui::Ui, camera_rect: egui::Rect) -> bool {
    let button = egui::Button::new(RichText::new("⟳ 再読み込み").size(15.0))
        .fill(Color32::from_black_alpha(160));
    ui.put(reload_button_rect(camera_rect), button).clicked()
}

/// Render the status strip at the bottom of the camera view.
pub fn render_status_bar(
    ui: &mut egui::Ui,
    camera_rect: egui::Rect,
    state: &GuiState,
    zoom: &ZoomState,
    ocr_ready: bool,
) {
    let mut parts = Vec::new();
    if state.scanning {
        parts.push("読み取り中...".to_string());
    } else if state.camera.is_live() {
        parts.push(state.camera.status_text());
    }
    if zoom.supported {
        parts.push(format!("ズーム {:.1}x", zoom.value));
    }
    if !ocr_ready {
        parts.push("文字認識準備中".to_string());
    }
    if parts.is_empty() {
        return;
    }

    let text = parts.join("  |  ");
    let pos = egui::pos2(camera_rect.center().x, camera_rect.bottom() - OVERLAY_MARGIN - 10.0);
    let galley = ui.painter().layout_no_wrap(
        text,
        egui::FontId::proportional(14.0),
        Color32::WHITE,
    );
    let bg = egui::Rect::from_center_size(pos, galley.size() + egui::vec2(16.0, 8.0));
    ui.painter().rect_filled(bg, 6.0, Color32::from_black_alpha(150));
    ui.painter()
        .galley(bg.center() - galley.size() / 2.0, galley, Color32::WHITE);
}

/// Render the scan result dialog.
/// Returns (close_clicked, map_clicked).
pub fn render_result_dialog(ctx: &egui::Context, dialog: &ResultDialog) -> (bool, bool) {
    let mut close_clicked = false;
    let mut map_clicked = false;

    egui::Window::new(dialog.title())
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            ui.set_min_width(280.0);
            ui.add_space(4.0);

            if let Some(facility) = dialog.facility() {
                ui.label(RichText::new(&facility.name).size(20.0).strong());
                ui.label(RichText::new(facility.kind.label()).color(Color32::GRAY));
                if let Some(desc) = &facility.description {
                    ui.add_space(4.0);
                    ui.label(desc);
                }
                ui.add_space(8.0);
            }
            ui.label(dialog.message());

            ui.add_space(12.0);
            ui.horizontal(|ui| {
                if let Some(facility) = dialog.facility() {
                    let link = facility_map_link(facility, Platform::current());
                    if ui
                        .button(RichText::new("🗺 地図で開く").size(15.0))
                        .on_hover_text(&link)
                        .clicked()
                    {
                        ctx.open_url(egui::OpenUrl::new_tab(link));
                        map_clicked = true;
                    }
                    ui.add_space(12.0);
                }
                if ui.button(RichText::new("閉じる").size(15.0)).clicked() {
                    close_clicked = true;
                }
            });
        });

    (close_clicked, map_clicked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_button_sits_inside_top_right() {
        let camera = egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(800.0, 600.0));
        let button = reload_button_rect(camera);
        assert!(camera.contains_rect(button));
        assert_eq!(button.right(), 800.0 - OVERLAY_MARGIN);
        assert_eq!(button.top(), OVERLAY_MARGIN);
    }
}
