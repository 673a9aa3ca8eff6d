use candle_core::{DType, Device, Result, Tensor, Var};
use candle_util::candle_vector_raster::{render, RenderOptions};
use candle_util::candle_vector_scene::{Path, Scene, ShapeGroup, OPAQUE_WHITE};

fn square_points(lo: f32, hi: f32, dev: &Device) -> Result<Tensor> {
    Tensor::new(&[[lo, lo], [hi, lo], [hi, hi], [lo, hi]], dev)
}

fn filled_scene(points: Tensor, fill: bool, stroke: bool) -> Result<Scene> {
    let path = Path::new(vec![0; 4], points, true);
    let group = ShapeGroup::new(
        vec![0],
        fill.then_some(OPAQUE_WHITE),
        stroke.then_some(OPAQUE_WHITE),
    );
    Scene::new(16, 16, vec![path], vec![group])
}

fn alpha_at(img_hw4: &Tensor, y: usize, x: usize) -> Result<f32> {
    img_hw4.get(y)?.get(x)?.get(3)?.to_scalar::<f32>()
}

#[test]
fn filled_square_covers_interior_only() -> Result<()> {
    let dev = Device::Cpu;
    let scene = filled_scene(square_points(4., 12., &dev)?, true, false)?;
    let img = render(&scene, &RenderOptions::default())?;
    assert_eq!(img.dims(), &[16, 16, 4]);

    assert!(alpha_at(&img, 8, 8)? > 0.99);
    assert!(alpha_at(&img, 0, 0)? < 0.01);
    assert!(alpha_at(&img, 15, 8)? < 0.01);

    // pixel straddling the left edge is partially covered
    let edge = alpha_at(&img, 8, 3)?;
    assert!(edge > 0.05 && edge < 0.95, "edge coverage {}", edge);

    // opaque white: premultiplied colour equals alpha
    let px = img.get(8)?.get(8)?.to_vec1::<f32>()?;
    assert!((px[0] - px[3]).abs() < 1e-6);
    Ok(())
}

#[test]
fn values_stay_in_unit_interval() -> Result<()> {
    let dev = Device::Cpu;
    let scene = filled_scene(square_points(-5., 30., &dev)?, true, true)?;
    let img = render(&scene, &RenderOptions::default())?;
    assert!(img.min_all()?.to_scalar::<f32>()? >= 0.);
    assert!(img.max_all()?.to_scalar::<f32>()? <= 1. + 1e-6);
    Ok(())
}

#[test]
fn stroke_only_leaves_interior_empty() -> Result<()> {
    let dev = Device::Cpu;
    let scene = filled_scene(square_points(2., 14., &dev)?, false, true)?;
    let img = render(&scene, &RenderOptions::default())?;
    assert!(alpha_at(&img, 8, 8)? < 0.01);
    assert!(alpha_at(&img, 2, 8)? > 0.3);
    Ok(())
}

#[test]
fn rendering_is_deterministic_for_a_seed() -> Result<()> {
    let dev = Device::Cpu;
    let pts = Tensor::new(
        &[[3f32, 2.], [14., 4.], [9., 9.], [12., 14.], [2., 12.], [6., 7.]],
        &dev,
    )?;
    let path = Path::new(vec![2, 2], pts, true);
    let group = ShapeGroup::new(vec![0], Some(OPAQUE_WHITE), Some(OPAQUE_WHITE));
    let scene = Scene::new(16, 16, vec![path], vec![group])?;

    let opts = RenderOptions {
        seed: 102,
        ..Default::default()
    };
    let a = render(&scene, &opts)?.flatten_all()?.to_vec1::<f32>()?;
    let b = render(&scene, &opts)?.flatten_all()?.to_vec1::<f32>()?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn empty_scene_is_transparent() -> Result<()> {
    let scene = Scene::new(4, 3, vec![], vec![])?;
    let img = render(&scene, &RenderOptions::default())?;
    assert_eq!(img.dims(), &[3, 4, 4]);
    assert_eq!(img.sum_all()?.to_scalar::<f32>()?, 0.);
    Ok(())
}

#[test]
fn gradients_reach_path_points() -> Result<()> {
    let dev = Device::Cpu;
    let var = Var::from_tensor(&square_points(4., 12., &dev)?)?;
    let scene = filled_scene(var.as_tensor().clone(), true, false)?;
    let img = render(&scene, &RenderOptions::default())?;

    let coverage = img.narrow(2, 3, 1)?.sum_all()?;
    let grads = coverage.backward()?;
    let g = grads.get(var.as_tensor()).expect("gradient for points");
    assert_eq!(g.dims(), &[4, 2]);

    // moving the lower-left corner outwards grows the square
    let g = g.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    assert!(g[0][0] < 0., "d coverage / d x0 = {}", g[0][0]);
    assert!(g[0][1] < 0., "d coverage / d y0 = {}", g[0][1]);
    assert!(g[2][0] > 0., "d coverage / d x2 = {}", g[2][0]);
    Ok(())
}

#[test]
fn fill_rules_differ_on_a_doubly_wound_square() -> Result<()> {
    let dev = Device::Cpu;
    let once = square_points(4., 12., &dev)?;
    let twice = Tensor::cat(&[&once, &once], 0)?;

    let render_with = |even_odd: bool| -> Result<Tensor> {
        let path = Path::new(vec![0; 8], twice.clone(), true);
        let group = ShapeGroup {
            use_even_odd_rule: even_odd,
            ..ShapeGroup::new(vec![0], Some(OPAQUE_WHITE), None)
        };
        let scene = Scene::new(16, 16, vec![path], vec![group])?;
        render(&scene, &RenderOptions::default())
    };

    // winding number 2 inside
    let nonzero = render_with(false)?;
    assert!(alpha_at(&nonzero, 8, 8)? > 0.99);
    assert!(alpha_at(&nonzero, 0, 0)? < 0.01);

    let even_odd = render_with(true)?;
    assert!(alpha_at(&even_odd, 8, 8)? < 0.01);
    Ok(())
}

#[test]
fn open_path_stroke_skips_the_closing_edge() -> Result<()> {
    let dev = Device::Cpu;
    let stroke_only = |closed: bool| -> Result<Tensor> {
        // an open path has one segment fewer for the same four points
        let num_segments = if closed { 4 } else { 3 };
        let path = Path::new(vec![0; num_segments], square_points(4., 12., &dev)?, closed);
        let group = ShapeGroup::new(vec![0], None, Some(OPAQUE_WHITE));
        let scene = Scene::new(16, 16, vec![path], vec![group])?;
        render(&scene, &RenderOptions::default())
    };

    let open = stroke_only(false)?;
    // top and right edges are drawn
    assert!(alpha_at(&open, 4, 8)? > 0.3);
    assert!(alpha_at(&open, 8, 11)? > 0.3);
    // left side from (4, 12) back to (4, 4) is not
    assert!(alpha_at(&open, 8, 4)? < 0.05);
    assert!(alpha_at(&open, 8, 8)? < 0.01);

    let closed = stroke_only(true)?;
    assert!(alpha_at(&closed, 8, 4)? > 0.3);
    Ok(())
}
