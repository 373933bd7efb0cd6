use argh::FromArgs;
use std::path::PathBuf;

use nerfkit::field::{self, AxisOrder, ExecutionStrategy, FieldExtractor, GridBounds};

#[derive(FromArgs)]
/// Extract the surface of an analytic signed distance field and write it as OBJ or PLY
struct Args {
    /// path to the output mesh, `.obj` or `.ply`
    #[argh(option, short = 'o')]
    output: PathBuf,

    /// the shape to extract: sphere or torus
    #[argh(option, default = "String::from(\"sphere\")")]
    shape: String,

    /// samples per axis
    #[argh(option, default = "128")]
    resolution: usize,

    /// half extent of the sampled cube
    #[argh(option, default = "1.0")]
    bound: f64,

    /// sphere radius, or torus major radius
    #[argh(option, default = "0.5")]
    radius: f64,

    /// the iso value
    #[argh(option, default = "0.0")]
    threshold: f32,

    /// number of threads, 0 uses the global pool
    #[argh(option, default = "0")]
    num_threads: usize,

    /// write vertices in (z, x, y) order
    #[argh(switch)]
    zxy: bool,
}

fn sphere_sdf(p: &[f64; 3], radius: f64) -> f32 {
    ((p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt() - radius) as f32
}

fn torus_sdf(p: &[f64; 3], radius: f64) -> f32 {
    let ring = (p[0] * p[0] + p[1] * p[1]).sqrt() - radius;
    ((ring * ring + p[2] * p[2]).sqrt() - radius / 3.0) as f32
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let sdf: fn(&[f64; 3], f64) -> f32 = match args.shape.as_str() {
        "sphere" => sphere_sdf,
        "torus" => torus_sdf,
        other => return Err(format!("unknown shape: {other}").into()),
    };
    let radius = args.radius;
    let query = field::PointwiseField(move |p: &[f64; 3]| sdf(p, radius));

    let strategy = match args.num_threads {
        0 => ExecutionStrategy::Parallel,
        n => ExecutionStrategy::Fixed(n),
    };
    let extractor = FieldExtractor::default().with_strategy(strategy);

    let bounds = GridBounds::cube(args.bound)?;
    let start = std::time::Instant::now();
    let mut mesh =
        extractor.extract_geometry(&bounds, args.resolution, args.threshold, &query, true)?;
    log::info!(
        "extracted {} vertices and {} triangles in {:?}",
        mesh.len(),
        mesh.num_triangles(),
        start.elapsed()
    );

    if !mesh.is_closed() {
        log::warn!(
            "mesh has {} boundary edges, the surface leaves the sampled cube",
            mesh.boundary_edges().len()
        );
    }

    if args.zxy {
        mesh.swizzle_axes(AxisOrder::Zxy);
    }

    field::write_mesh(&args.output, &mesh)?;
    println!("Wrote mesh to {}", args.output.display());

    Ok(())
}
