use approx::assert_relative_eq;
use nerfkit_rays::{
    generate_rays, rays::rays_for_indices, CameraPose, ImageSize, PinholeIntrinsics, RayError,
};
use rand::{rngs::StdRng, SeedableRng};

fn orbit_pose(angle: f64, radius: f64) -> CameraPose {
    let (s, c) = angle.sin_cos();
    // rotation about the y axis, camera placed on a circle around the origin
    CameraPose::from_rotation_translation(
        &[[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]],
        &[radius * s, 0.5, radius * c],
    )
    .unwrap()
}

fn skewed_intrinsics() -> PinholeIntrinsics {
    PinholeIntrinsics::with_skew(120.0, 110.0, 15.5, 11.5, 0.75).unwrap()
}

#[test]
fn dense_rays_cover_every_pixel_in_row_major_order() -> Result<(), RayError> {
    let size = ImageSize {
        width: 32,
        height: 24,
    };
    let poses = [orbit_pose(0.3, 4.0), orbit_pose(-1.2, 3.0)];
    let intrinsics = [skewed_intrinsics(), skewed_intrinsics()];

    let batches = generate_rays(&poses, &intrinsics, size, -1, &mut StdRng::seed_from_u64(0))?;
    assert_eq!(batches.len(), 2);

    for batch in &batches {
        assert_eq!(batch.len(), size.num_pixels());
        assert_eq!(batch.directions.len(), size.num_pixels());
        assert_eq!(
            batch.select_indices,
            (0..size.num_pixels()).collect::<Vec<_>>()
        );
    }
    Ok(())
}

#[test]
fn sampled_rays_share_the_pose_origin() -> Result<(), RayError> {
    let size = ImageSize {
        width: 16,
        height: 8,
    };
    let poses = [orbit_pose(0.7, 2.5), orbit_pose(2.0, 5.0)];
    let intrinsics = [skewed_intrinsics(), skewed_intrinsics()];
    let mut rng = StdRng::seed_from_u64(7);

    let batches = generate_rays(&poses, &intrinsics, size, 50, &mut rng)?;
    for (batch, pose) in batches.iter().zip(poses.iter()) {
        assert_eq!(batch.len(), 50);
        assert_eq!(batch.select_indices.len(), 50);
        assert!(batch.origins.iter().all(|o| *o == pose.translation()));
        assert!(batch
            .select_indices
            .iter()
            .all(|&i| i < size.num_pixels()));
    }
    // every batch element uses the same pixel selection
    assert_eq!(batches[0].select_indices, batches[1].select_indices);
    Ok(())
}

#[test]
fn ray_directions_are_unit_length() -> Result<(), RayError> {
    let size = ImageSize {
        width: 20,
        height: 10,
    };
    let batches = generate_rays(
        &[orbit_pose(1.1, 3.0)],
        &[skewed_intrinsics()],
        size,
        -1,
        &mut StdRng::seed_from_u64(0),
    )?;
    for d in &batches[0].directions {
        let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn dense_generation_is_deterministic() -> Result<(), RayError> {
    let size = ImageSize {
        width: 9,
        height: 7,
    };
    let poses = [orbit_pose(0.4, 2.0)];
    let intrinsics = [skewed_intrinsics()];

    let a = generate_rays(&poses, &intrinsics, size, -1, &mut StdRng::seed_from_u64(1))?;
    let b = generate_rays(&poses, &intrinsics, size, -1, &mut StdRng::seed_from_u64(2))?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn sampled_rays_match_dense_rays_for_the_same_pixels() -> Result<(), RayError> {
    let size = ImageSize {
        width: 12,
        height: 6,
    };
    let pose = orbit_pose(-0.8, 3.5);
    let k = skewed_intrinsics();

    let dense = generate_rays(&[pose], &[k], size, -1, &mut StdRng::seed_from_u64(0))?;
    let sampled = generate_rays(&[pose], &[k], size, 20, &mut StdRng::seed_from_u64(3))?;

    for (i, &index) in sampled[0].select_indices.iter().enumerate() {
        assert_eq!(sampled[0].directions[i], dense[0].directions[index]);
    }

    let explicit = rays_for_indices(&pose, &k, size, &sampled[0].select_indices);
    assert_eq!(explicit, sampled[0]);
    Ok(())
}

#[test]
fn oversized_request_is_clamped() -> Result<(), RayError> {
    let size = ImageSize {
        width: 4,
        height: 4,
    };
    let batches = generate_rays(
        &[CameraPose::identity()],
        &[skewed_intrinsics()],
        size,
        1_000,
        &mut StdRng::seed_from_u64(0),
    )?;
    assert_eq!(batches[0].len(), 16);
    Ok(())
}
