//! Skeleton overlay drawing

use image::{Rgb, RgbImage};

use crate::error::PipelineError;
use crate::inference::PoseEstimate;
use crate::OverlayConfig;

/// Resolved drawing style for pose overlays
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub connector_color: Rgb<u8>,
    pub connector_width: u32,
    pub landmark_color: Rgb<u8>,
    pub landmark_radius: u32,
    pub min_visibility: f32,
}

impl OverlayStyle {
    pub fn from_config(config: &OverlayConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            connector_color: parse_hex_color(&config.connector_color)?,
            connector_width: config.connector_width,
            landmark_color: parse_hex_color(&config.landmark_color)?,
            landmark_radius: config.landmark_radius,
            min_visibility: config.min_visibility,
        })
    }

    /// Draw connections first, then landmarks on top of them
    pub fn draw(&self, canvas: &mut RgbImage, estimate: &PoseEstimate) {
        let (w, h) = (f64::from(canvas.width()), f64::from(canvas.height()));
        let to_px = |i: usize| {
            let k = &estimate.keypoints[i];
            let p = (f64::from(k.x) * w, f64::from(k.y) * h);
            (p.0.is_finite() && p.1.is_finite()).then_some(p)
        };
        let visible = |i: usize| estimate.keypoints[i].is_visible(self.min_visibility);

        let half_width = self.connector_width / 2;
        let bounds = Bounds::around(canvas, half_width);
        for (a, b) in estimate.segments() {
            if !(visible(a) && visible(b)) {
                continue;
            }
            if let (Some(p0), Some(p1)) = (to_px(a), to_px(b)) {
                if let Some((p0, p1)) = bounds.clip(p0, p1) {
                    draw_segment(canvas, p0, p1, i64::from(half_width), self.connector_color);
                }
            }
        }

        let bounds = Bounds::around(canvas, self.landmark_radius);
        for i in 0..estimate.keypoints.len() {
            if !visible(i) {
                continue;
            }
            if let Some(p) = to_px(i).filter(|&p| bounds.contains(p)) {
                let (x, y) = bounds.snap(p);
                fill_disc(canvas, x, y, i64::from(self.landmark_radius), self.landmark_color);
            }
        }
    }
}

/// Pixel rectangle a stroke may touch: the canvas grown by the stroke radius
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: f64,
    max_x: f64,
    max_y: f64,
}

impl Bounds {
    fn around(canvas: &RgbImage, margin: u32) -> Self {
        let margin = f64::from(margin);
        Self {
            min: -margin,
            max_x: f64::from(canvas.width()) - 1.0 + margin,
            max_y: f64::from(canvas.height()) - 1.0 + margin,
        }
    }

    fn contains(&self, (x, y): (f64, f64)) -> bool {
        (self.min..=self.max_x).contains(&x) && (self.min..=self.max_y).contains(&y)
    }

    fn snap(&self, (x, y): (f64, f64)) -> (i64, i64) {
        (
            x.clamp(self.min, self.max_x).round() as i64,
            y.clamp(self.min, self.max_y).round() as i64,
        )
    }

    /// Liang-Barsky clip of the segment `p0 -> p1`, `None` when it misses
    fn clip(&self, p0: (f64, f64), p1: (f64, f64)) -> Option<((i64, i64), (i64, i64))> {
        let (dx, dy) = (p1.0 - p0.0, p1.1 - p0.1);
        let (mut t0, mut t1) = (0.0f64, 1.0f64);
        let edges = [
            (-dx, p0.0 - self.min),
            (dx, self.max_x - p0.0),
            (-dy, p0.1 - self.min),
            (dy, self.max_y - p0.1),
        ];
        for (p, q) in edges {
            if p == 0.0 {
                if q < 0.0 {
                    return None;
                }
                continue;
            }
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
            if t0 > t1 {
                return None;
            }
        }
        let at = |t: f64| self.snap((p0.0 + t * dx, p0.1 + t * dy));
        Some((at(t0), at(t1)))
    }
}

/// Parse `#RRGGBB` (the leading `#` is optional)
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>, PipelineError> {
    let hex = value.strip_prefix('#').unwrap_or(value);
    let invalid = || PipelineError::Config(format!("invalid color '{}'", value));
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(invalid());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Thick line: stamp a disc at every point of a Bresenham walk
fn draw_segment(
    canvas: &mut RgbImage,
    (x0, y0): (i64, i64),
    (x1, y1): (i64, i64),
    radius: i64,
    color: Rgb<u8>,
) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (x0, y0);

    loop {
        fill_disc(canvas, x, y, radius, color);
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

fn fill_disc(canvas: &mut RgbImage, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    let r2 = radius * radius;
    for y in (cy - radius).max(0)..=(cy + radius).min(h - 1) {
        for x in (cx - radius).max(0)..=(cx + radius).min(w - 1) {
            let (ox, oy) = (x - cx, y - cy);
            if ox * ox + oy * oy <= r2 {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::Keypoint;
    use crate::Config;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn style() -> OverlayStyle {
        OverlayStyle::from_config(&Config::default().overlay).unwrap()
    }

    #[test]
    fn parses_colors() {
        assert_eq!(parse_hex_color("#00FF00").unwrap(), Rgb([0, 255, 0]));
        assert_eq!(parse_hex_color("ff0000").unwrap(), Rgb([255, 0, 0]));
        assert!(parse_hex_color("#0f0").is_err());
        assert!(parse_hex_color("#GG0000").is_err());
        assert!(parse_hex_color("#ééé").is_err());
    }

    #[test]
    fn default_style() {
        let style = style();
        assert_eq!(style.connector_color, Rgb([0, 255, 0]));
        assert_eq!(style.landmark_color, Rgb([255, 0, 0]));
        assert_eq!(style.landmark_radius, 6);
    }

    #[test]
    fn draws_landmarks_over_connections() {
        let mut canvas = RgbImage::new(100, 100);
        let estimate = PoseEstimate {
            keypoints: vec![Keypoint::new(0.1, 0.5), Keypoint::new(0.9, 0.5)],
            connections: Some(vec![(0, 1)]),
        };
        style().draw(&mut canvas, &estimate);

        // landmark centers are red, the midpoint of the segment is green
        assert_eq!(*canvas.get_pixel(10, 50), Rgb([255, 0, 0]));
        assert_eq!(*canvas.get_pixel(90, 50), Rgb([255, 0, 0]));
        assert_eq!(*canvas.get_pixel(50, 50), Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(50, 10), BLACK);
    }

    #[test]
    fn hidden_keypoints_are_skipped_with_their_connections() {
        let mut canvas = RgbImage::new(100, 100);
        let estimate = PoseEstimate {
            keypoints: vec![
                Keypoint::new(0.1, 0.5),
                Keypoint::new(0.9, 0.5).with_visibility(0.1),
            ],
            connections: Some(vec![(0, 1)]),
        };
        style().draw(&mut canvas, &estimate);

        assert_eq!(*canvas.get_pixel(10, 50), Rgb([255, 0, 0]));
        assert_eq!(*canvas.get_pixel(90, 50), BLACK);
        assert_eq!(*canvas.get_pixel(50, 50), BLACK);
    }

    #[test]
    fn non_finite_keypoints_are_ignored() {
        let mut canvas = RgbImage::new(50, 50);
        let estimate = PoseEstimate {
            keypoints: vec![
                Keypoint::new(0.5, 0.5),
                Keypoint::new(f32::NAN, 0.5),
                Keypoint::new(f32::INFINITY, 0.2),
            ],
            connections: Some(vec![(0, 1), (0, 2)]),
        };
        style().draw(&mut canvas, &estimate);

        assert_eq!(*canvas.get_pixel(25, 25), Rgb([255, 0, 0]));
        assert!(!canvas.pixels().any(|p| *p == Rgb([0, 255, 0])));
    }

    #[test]
    fn huge_coordinates_are_clipped_to_the_canvas() {
        let mut canvas = RgbImage::new(100, 100);
        let estimate = PoseEstimate {
            keypoints: vec![Keypoint::new(0.1, 0.5), Keypoint::new(1e30, 0.5)],
            connections: Some(vec![(0, 1)]),
        };
        style().draw(&mut canvas, &estimate);

        assert_eq!(*canvas.get_pixel(10, 50), Rgb([255, 0, 0]));
        assert_eq!(*canvas.get_pixel(99, 50), Rgb([0, 255, 0]));
        assert_eq!(*canvas.get_pixel(50, 10), BLACK);
    }

    #[test]
    fn far_off_canvas_segment_is_drawn_quickly() {
        let mut canvas = RgbImage::new(100, 100);
        let estimate = PoseEstimate {
            keypoints: vec![Keypoint::new(0.1, 0.5), Keypoint::new(1e5, 0.5)],
            connections: Some(vec![(0, 1)]),
        };
        let start = std::time::Instant::now();
        style().draw(&mut canvas, &estimate);

        assert!(start.elapsed() < std::time::Duration::from_millis(250));
        assert_eq!(*canvas.get_pixel(60, 50), Rgb([0, 255, 0]));
    }

    #[test]
    fn segment_entirely_off_canvas_draws_nothing() {
        let mut canvas = RgbImage::new(40, 40);
        let estimate = PoseEstimate {
            keypoints: vec![Keypoint::new(-3.0, -3.0), Keypoint::new(5.0, -2.0)],
            connections: Some(vec![(0, 1)]),
        };
        style().draw(&mut canvas, &estimate);
        assert!(canvas.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn clips_at_canvas_edges() {
        let mut canvas = RgbImage::new(20, 20);
        let estimate = PoseEstimate {
            keypoints: vec![Keypoint::new(-0.5, 0.0), Keypoint::new(1.5, 1.0)],
            connections: Some(vec![(0, 1)]),
        };
        style().draw(&mut canvas, &estimate);
        assert!(canvas.pixels().any(|p| *p == Rgb([0, 255, 0])));
    }
}
