use candle_core::{Result, Tensor};
use std::fmt::Write;

/// Straight RGBA colour, each channel in [0, 1]
pub type Rgba = [f32; 4];

pub const OPAQUE_WHITE: Rgba = [1., 1., 1., 1.];

/// A piecewise Bézier path
///
/// Segment `s` starts at an anchor point, then uses
/// `num_control_points[s]` control points (0: line, 1: quadratic, 2:
/// cubic), and ends at the next anchor. A closed path ends its last
/// segment at point 0.
#[derive(Clone, Debug)]
pub struct Path {
    pub num_control_points: Vec<u32>,
    pub points: Tensor, // p x 2 in pixel coordinates
    pub is_closed: bool,
    pub stroke_width: f32,
}

impl Path {
    /// Default stroke width in pixels
    pub const STROKE_WIDTH: f32 = 1.;

    pub fn new(num_control_points: Vec<u32>, points: Tensor, is_closed: bool) -> Self {
        Self {
            num_control_points,
            points,
            is_closed,
            stroke_width: Self::STROKE_WIDTH,
        }
    }

    pub fn with_stroke_width(mut self, stroke_width: f32) -> Self {
        self.stroke_width = stroke_width;
        self
    }

    pub fn num_segments(&self) -> usize {
        self.num_control_points.len()
    }

    /// Number of points required by the segment layout
    pub fn expected_num_points(&self) -> usize {
        let ctrl: usize = self.num_control_points.iter().map(|&c| c as usize).sum();
        let anchors = if self.is_closed {
            self.num_segments()
        } else {
            self.num_segments() + 1
        };
        ctrl + anchors
    }

    /// Point indices of every segment, from its start anchor to its
    /// end anchor inclusive.
    pub fn segment_point_indices(&self) -> Vec<Vec<u32>> {
        let num_points = self.expected_num_points() as u32;
        let mut start = 0u32;
        self.num_control_points
            .iter()
            .map(|&c| {
                let idx = (0..=(c + 1))
                    .map(|j| (start + j) % num_points)
                    .collect::<Vec<_>>();
                start += c + 1;
                idx
            })
            .collect()
    }

    /// SVG path data (`M`, `L`, `Q`, `C`, `Z` commands)
    pub fn to_svg_path_data(&self) -> Result<String> {
        let pts = self.points.to_dtype(candle_core::DType::F32)?.to_vec2::<f32>()?;
        let mut data = String::new();
        let mut first = true;
        for seg in self.segment_point_indices() {
            let p = |j: usize| &pts[seg[j] as usize];
            if first {
                write!(data, "M {} {}", p(0)[0], p(0)[1]).map_err(candle_core::Error::wrap)?;
                first = false;
            }
            let written = match seg.len() {
                2 => write!(data, " L {} {}", p(1)[0], p(1)[1]),
                3 => write!(data, " Q {} {} {} {}", p(1)[0], p(1)[1], p(2)[0], p(2)[1]),
                _ => write!(
                    data,
                    " C {} {} {} {} {} {}",
                    p(1)[0],
                    p(1)[1],
                    p(2)[0],
                    p(2)[1],
                    p(3)[0],
                    p(3)[1]
                ),
            };
            written.map_err(candle_core::Error::wrap)?;
        }
        if self.is_closed {
            data.push_str(" Z");
        }
        Ok(data)
    }
}

/// Paint shared by a group of shapes
#[derive(Clone, Debug)]
pub struct ShapeGroup {
    pub shape_ids: Vec<usize>,
    pub fill_color: Option<Rgba>,
    pub stroke_color: Option<Rgba>,
    pub use_even_odd_rule: bool,
}

impl ShapeGroup {
    pub fn new(shape_ids: Vec<usize>, fill_color: Option<Rgba>, stroke_color: Option<Rgba>) -> Self {
        Self {
            shape_ids,
            fill_color,
            stroke_color,
            use_even_odd_rule: true,
        }
    }
}

/// Everything the rasterizer needs for one image
#[derive(Clone, Debug)]
pub struct Scene {
    pub canvas_width: usize,
    pub canvas_height: usize,
    pub shapes: Vec<Path>,
    pub shape_groups: Vec<ShapeGroup>,
}

fn check_color(color: &Option<Rgba>) -> Result<()> {
    if let Some(c) = color {
        if c.iter().any(|x| !x.is_finite() || *x < 0. || *x > 1.) {
            candle_core::bail!("colour channels must lie in [0, 1], got {:?}", c);
        }
    }
    Ok(())
}

impl Scene {
    /// Assemble and validate a scene
    pub fn new(
        canvas_width: usize,
        canvas_height: usize,
        shapes: Vec<Path>,
        shape_groups: Vec<ShapeGroup>,
    ) -> Result<Self> {
        if canvas_width == 0 || canvas_height == 0 {
            candle_core::bail!("empty canvas {} x {}", canvas_width, canvas_height);
        }

        for (s, path) in shapes.iter().enumerate() {
            if path.num_segments() == 0 {
                candle_core::bail!("shape {} has no segments", s);
            }
            if let Some(&c) = path.num_control_points.iter().find(|&&c| c > 2) {
                candle_core::bail!("shape {}: {} control points per segment", s, c);
            }
            let (np, d) = path.points.dims2()?;
            if d != 2 || np != path.expected_num_points() {
                candle_core::bail!(
                    "shape {}: expected {} x 2 points, got {} x {}",
                    s,
                    path.expected_num_points(),
                    np,
                    d
                );
            }
        }

        for (g, group) in shape_groups.iter().enumerate() {
            if let Some(&id) = group.shape_ids.iter().find(|&&id| id >= shapes.len()) {
                candle_core::bail!("group {} refers to missing shape {}", g, id);
            }
            check_color(&group.fill_color)?;
            check_color(&group.stroke_color)?;
        }

        Ok(Self {
            canvas_width,
            canvas_height,
            shapes,
            shape_groups,
        })
    }

    /// Write the scene as a standalone SVG document
    pub fn to_svg(&self) -> Result<String> {
        fn paint(attr: &str, color: &Option<Rgba>) -> String {
            match color {
                Some(c) => format!(
                    "{attr}=\"rgb({},{},{})\" {attr}-opacity=\"{}\"",
                    (c[0] * 255.).round() as u8,
                    (c[1] * 255.).round() as u8,
                    (c[2] * 255.).round() as u8,
                    c[3]
                ),
                None => format!("{attr}=\"none\""),
            }
        }

        let mut svg = String::new();
        writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
            w = self.canvas_width,
            h = self.canvas_height
        )
        .map_err(candle_core::Error::wrap)?;

        for group in &self.shape_groups {
            let fill = paint("fill", &group.fill_color);
            let stroke = paint("stroke", &group.stroke_color);
            let rule = if group.use_even_odd_rule {
                "evenodd"
            } else {
                "nonzero"
            };
            for &id in &group.shape_ids {
                let path = &self.shapes[id];
                writeln!(
                    svg,
                    "  <path d=\"{}\" {} fill-rule=\"{}\" {} stroke-width=\"{}\"/>",
                    path.to_svg_path_data()?,
                    fill,
                    rule,
                    stroke,
                    path.stroke_width
                )
                .map_err(candle_core::Error::wrap)?;
            }
        }
        svg.push_str("</svg>\n");
        Ok(svg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn square(dev: &Device) -> Result<Tensor> {
        Tensor::new(&[[0f32, 0.], [4., 0.], [4., 4.], [0., 4.]], dev)
    }

    #[test]
    fn cubic_closed_path_indices_wrap() -> Result<()> {
        let dev = Device::Cpu;
        let points = Tensor::zeros((6, 2), candle_core::DType::F32, &dev)?;
        let path = Path::new(vec![2, 2], points, true);
        assert_eq!(path.expected_num_points(), 6);
        assert_eq!(
            path.segment_point_indices(),
            vec![vec![0, 1, 2, 3], vec![3, 4, 5, 0]]
        );
        Ok(())
    }

    #[test]
    fn open_path_needs_final_anchor() -> Result<()> {
        let dev = Device::Cpu;
        let points = Tensor::zeros((3, 2), candle_core::DType::F32, &dev)?;
        let path = Path::new(vec![1], points, false);
        assert_eq!(path.expected_num_points(), 3);
        assert_eq!(path.segment_point_indices(), vec![vec![0, 1, 2]]);
        Ok(())
    }

    #[test]
    fn scene_validation() -> Result<()> {
        let dev = Device::Cpu;
        let path = Path::new(vec![0; 4], square(&dev)?, true);

        let ok = Scene::new(
            8,
            8,
            vec![path.clone()],
            vec![ShapeGroup::new(vec![0], Some(OPAQUE_WHITE), None)],
        );
        assert!(ok.is_ok());

        let missing = Scene::new(
            8,
            8,
            vec![path.clone()],
            vec![ShapeGroup::new(vec![1], Some(OPAQUE_WHITE), None)],
        );
        assert!(missing.is_err());

        let wrong_count = Path::new(vec![2; 4], square(&dev)?, true);
        assert!(Scene::new(8, 8, vec![wrong_count], vec![]).is_err());

        let bad_color = Scene::new(
            8,
            8,
            vec![path],
            vec![ShapeGroup::new(vec![0], Some([2., 0., 0., 1.]), None)],
        );
        assert!(bad_color.is_err());
        Ok(())
    }

    #[test]
    fn svg_export_of_polygon() -> Result<()> {
        let dev = Device::Cpu;
        let path = Path::new(vec![0; 4], square(&dev)?, true);
        assert_eq!(path.to_svg_path_data()?, "M 0 0 L 4 0 L 4 4 L 0 4 L 0 0 Z");

        let scene = Scene::new(
            8,
            8,
            vec![path],
            vec![ShapeGroup::new(vec![0], Some(OPAQUE_WHITE), None)],
        )?;
        let svg = scene.to_svg()?;
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("fill=\"rgb(255,255,255)\" fill-opacity=\"1\""));
        assert!(svg.contains("stroke=\"none\""));
        assert!(svg.trim_end().ends_with("</svg>"));
        Ok(())
    }

    #[test]
    fn svg_export_of_curves() -> Result<()> {
        let dev = Device::Cpu;
        let points = Tensor::new(
            &[[0f32, 0.], [1., 2.], [3., 2.], [4., 0.], [2., -2.], [4., 4.]],
            &dev,
        )?;
        let closed = Path::new(vec![2, 0, 1], points, true);
        assert_eq!(
            closed.to_svg_path_data()?,
            "M 0 0 C 1 2 3 2 4 0 L 2 -2 Q 4 4 0 0 Z"
        );

        let scene = Scene::new(
            8,
            8,
            vec![closed],
            vec![ShapeGroup {
                use_even_odd_rule: false,
                ..ShapeGroup::new(vec![0], None, Some(OPAQUE_WHITE))
            }],
        )?;
        let svg = scene.to_svg()?;
        assert!(svg.contains("d=\"M 0 0 C 1 2 3 2 4 0 L 2 -2 Q 4 4 0 0 Z\""));
        assert!(svg.contains("fill-rule=\"nonzero\""));
        assert!(svg.contains("fill=\"none\""));
        Ok(())
    }
}
