//! Diagnostic overlay renderer.
//!
//! Draws bounding boxes, landmark dots, the landmark mesh, expression
//! bars, alignment readouts and short face identifiers onto a frame.
//! Every overlay is gated by its [`RenderOptions`] flag and is skipped
//! when the face record lacks the data it would draw. Face records are
//! never modified.

use crate::types::{BoundingBox, DetectedFace, FaceLandmarks, RenderOptions};
use image::{Rgb, RgbImage};

const BOX_COLOR: Rgb<u8> = Rgb([0, 220, 80]);
const LANDMARK_COLOR: Rgb<u8> = Rgb([240, 210, 40]);
const MESH_COLOR: Rgb<u8> = Rgb([60, 200, 220]);
const TEXT_COLOR: Rgb<u8> = Rgb([235, 235, 235]);
const PANEL_COLOR: Rgb<u8> = Rgb([18, 18, 18]);
const BAR_COLOR: Rgb<u8> = Rgb([90, 160, 250]);

const BAR_MAX_WIDTH: i64 = 40;
const BAR_HEIGHT: i64 = 4;
const BAR_GAP: i64 = 2;
const TEXT_SCALE: usize = 1;

/// Draw the enabled overlays for every face onto the frame.
pub fn render(frame: &mut RgbImage, faces: &[DetectedFace], options: &RenderOptions) {
    for face in faces {
        if options.show_box {
            draw_box_outline(frame, &face.bbox, BOX_COLOR);
        }
        if options.show_landmarks {
            if let Some(landmarks) = &face.landmarks {
                draw_landmark_dots(frame, landmarks);
            }
        }
        if options.show_mesh {
            if let Some(landmarks) = &face.landmarks {
                draw_mesh(frame, landmarks);
            }
        }
        if options.show_expression {
            if let Some(expression) = &face.expression {
                draw_expression_panel(frame, &face.bbox, expression);
            }
        }
        if options.show_alignment {
            if let Some(alignment) = &face.alignment {
                let label = format!(
                    "ANGLE {:.1} SCALE {:.2}",
                    alignment.angle, alignment.scale
                );
                draw_text(
                    frame,
                    face.bbox.x.round() as i64,
                    face.bbox.bottom().round() as i64 + 4,
                    &label,
                    TEXT_COLOR,
                );
            }
        }
        if options.show_id {
            let short_id = face.id.simple().to_string();
            let label = &short_id[..8.min(short_id.len())];
            draw_text(
                frame,
                face.bbox.x.round() as i64,
                face.bbox.y.round() as i64 - 8,
                label,
                TEXT_COLOR,
            );
        }
    }
}

fn draw_box_outline(frame: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    let x0 = bbox.x.round() as i64;
    let y0 = bbox.y.round() as i64;
    let x1 = bbox.right().round() as i64;
    let y1 = bbox.bottom().round() as i64;
    draw_line(frame, x0, y0, x1, y0, color);
    draw_line(frame, x1, y0, x1, y1, color);
    draw_line(frame, x1, y1, x0, y1, color);
    draw_line(frame, x0, y1, x0, y0, color);
}

fn draw_landmark_dots(frame: &mut RgbImage, landmarks: &FaceLandmarks) {
    for point in &landmarks.positions {
        let cx = point.x.round() as i64;
        let cy = point.y.round() as i64;
        for dy in -1..=1 {
            for dx in -1..=1 {
                put_pixel(frame, cx + dx, cy + dy, LANDMARK_COLOR);
            }
        }
    }
}

fn draw_mesh(frame: &mut RgbImage, landmarks: &FaceLandmarks) {
    let open: [&[crate::types::Point]; 5] = [
        &landmarks.jaw,
        &landmarks.left_eyebrow,
        &landmarks.right_eyebrow,
        &landmarks.nose_bridge,
        &landmarks.nose_tip,
    ];
    let closed: [&[crate::types::Point]; 5] = [
        &landmarks.left_eye,
        &landmarks.right_eye,
        &landmarks.outer_lips,
        &landmarks.inner_lips,
        &landmarks.face_oval,
    ];

    for group in open {
        draw_polyline(frame, group, false);
    }
    for group in closed {
        draw_polyline(frame, group, true);
    }
}

fn draw_polyline(frame: &mut RgbImage, points: &[crate::types::Point], closed: bool) {
    if points.len() < 2 {
        return;
    }
    for pair in points.windows(2) {
        draw_line(
            frame,
            pair[0].x.round() as i64,
            pair[0].y.round() as i64,
            pair[1].x.round() as i64,
            pair[1].y.round() as i64,
            MESH_COLOR,
        );
    }
    if closed {
        let (first, last) = (&points[0], &points[points.len() - 1]);
        draw_line(
            frame,
            last.x.round() as i64,
            last.y.round() as i64,
            first.x.round() as i64,
            first.y.round() as i64,
            MESH_COLOR,
        );
    }
}

fn draw_expression_panel(
    frame: &mut RgbImage,
    bbox: &BoundingBox,
    expression: &crate::types::FaceExpression,
) {
    let panel_x = bbox.right().round() as i64 + 4;
    let panel_y = bbox.y.round() as i64;

    let scores = [
        expression.neutral,
        expression.happy,
        expression.sad,
        expression.angry,
        expression.surprised,
        expression.fearful,
        expression.disgusted,
    ];

    let label_height = 5 * TEXT_SCALE as i64 + 3;
    let panel_height =
        label_height + scores.len() as i64 * (BAR_HEIGHT + BAR_GAP) + BAR_GAP;
    fill_rect(
        frame,
        panel_x - 2,
        panel_y - 2,
        BAR_MAX_WIDTH + 4,
        panel_height + 4,
        PANEL_COLOR,
    );

    let (dominant_name, _) = expression.dominant();
    draw_text(frame, panel_x, panel_y, &dominant_name.to_uppercase(), TEXT_COLOR);

    let mut bar_y = panel_y + label_height;
    for score in scores {
        let bar_width = (score.clamp(0.0, 1.0) * BAR_MAX_WIDTH as f32).round() as i64;
        if bar_width > 0 {
            fill_rect(frame, panel_x, bar_y, bar_width, BAR_HEIGHT, BAR_COLOR);
        }
        bar_y += BAR_HEIGHT + BAR_GAP;
    }
}

fn put_pixel(frame: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}

fn fill_rect(frame: &mut RgbImage, x: i64, y: i64, w: i64, h: i64, color: Rgb<u8>) {
    for py in y..y + h {
        for px in x..x + w {
            put_pixel(frame, px, py, color);
        }
    }
}

/// Bresenham line draw, clipped at the frame edge.
fn draw_line(frame: &mut RgbImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        put_pixel(frame, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_text(frame: &mut RgbImage, x: i64, y: i64, text: &str, color: Rgb<u8>) {
    let mut cx = x;
    for c in text.chars() {
        draw_char(frame, cx, y, c, color);
        cx += (3 * TEXT_SCALE as i64) + TEXT_SCALE as i64;
    }
}

/// 3x5 bitmap glyphs, 3 bits per row. Covers digits, hex letters and the
/// uppercase letters used by expression and alignment labels.
fn glyph(c: char) -> [u8; 5] {
    match c.to_ascii_uppercase() {
        '0' => [0x7, 0x5, 0x5, 0x5, 0x7],
        '1' => [0x2, 0x6, 0x2, 0x2, 0x7],
        '2' => [0x7, 0x1, 0x7, 0x4, 0x7],
        '3' => [0x7, 0x1, 0x7, 0x1, 0x7],
        '4' => [0x5, 0x5, 0x7, 0x1, 0x1],
        '5' => [0x7, 0x4, 0x7, 0x1, 0x7],
        '6' => [0x7, 0x4, 0x7, 0x5, 0x7],
        '7' => [0x7, 0x1, 0x2, 0x4, 0x4],
        '8' => [0x7, 0x5, 0x7, 0x5, 0x7],
        '9' => [0x7, 0x5, 0x7, 0x1, 0x7],
        'A' => [0x2, 0x5, 0x7, 0x5, 0x5],
        'B' => [0x6, 0x5, 0x6, 0x5, 0x6],
        'C' => [0x7, 0x4, 0x4, 0x4, 0x7],
        'D' => [0x6, 0x5, 0x5, 0x5, 0x6],
        'E' => [0x7, 0x4, 0x6, 0x4, 0x7],
        'F' => [0x7, 0x4, 0x6, 0x4, 0x4],
        'G' => [0x7, 0x4, 0x5, 0x5, 0x7],
        'H' => [0x5, 0x5, 0x7, 0x5, 0x5],
        'I' => [0x7, 0x2, 0x2, 0x2, 0x7],
        'L' => [0x4, 0x4, 0x4, 0x4, 0x7],
        'N' => [0x6, 0x5, 0x5, 0x5, 0x5],
        'O' => [0x7, 0x5, 0x5, 0x5, 0x7],
        'P' => [0x7, 0x5, 0x7, 0x4, 0x4],
        'R' => [0x6, 0x5, 0x6, 0x5, 0x5],
        'S' => [0x3, 0x4, 0x2, 0x1, 0x6],
        'T' => [0x7, 0x2, 0x2, 0x2, 0x2],
        'U' => [0x5, 0x5, 0x5, 0x5, 0x7],
        'Y' => [0x5, 0x5, 0x2, 0x2, 0x2],
        '.' => [0x0, 0x0, 0x0, 0x0, 0x2],
        '-' => [0x0, 0x0, 0x7, 0x0, 0x0],
        ':' => [0x0, 0x2, 0x0, 0x2, 0x0],
        ' ' => [0x0, 0x0, 0x0, 0x0, 0x0],
        _ => [0x7, 0x7, 0x7, 0x7, 0x7],
    }
}

fn draw_char(frame: &mut RgbImage, x: i64, y: i64, c: char, color: Rgb<u8>) {
    let rows = glyph(c);
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..3i64 {
            if (bits >> (2 - col)) & 1 == 1 {
                for dy in 0..TEXT_SCALE as i64 {
                    for dx in 0..TEXT_SCALE as i64 {
                        put_pixel(
                            frame,
                            x + col * TEXT_SCALE as i64 + dx,
                            y + row as i64 * TEXT_SCALE as i64 + dy,
                            color,
                        );
                    }
                }
            }
        }
    }
}
