use crate::errors::SceneError;
use crate::simulation::ParticleVec;
use crate::simulation_parameters::SimulationParams;
use crate::{floating_type_mod::FT, vecf_from_slice, VF};

use serde::{Deserialize, Serialize};
use tracing::debug;

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// A block of fluid spanned by `origin` and one edge vector per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    pub origin: Vec<FT>,
    pub edges: Vec<Vec<FT>>,
    #[serde(default)]
    pub velocity: Option<Vec<FT>>,
}

/// A segment (2D) or triangle (3D) sampled with boundary particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleConfig {
    pub vertices: Vec<Vec<FT>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    pub boundary_spacing: FT,
    #[serde(default)]
    pub clouds: Vec<CloudConfig>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
}

impl SceneConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<SceneConfig, SceneError> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(file)?)
    }
}

/// Initial state handed to `FluidSimulation::initialize`.
#[derive(Debug, Clone)]
pub struct Scene<const D: usize> {
    pub particles: ParticleVec<D>,
    pub boundary_positions: Vec<VF<D>>,
}

/// Parameters in [0, 1] of `floor(length / spacing)` points, centered on a segment.
fn segment_params(length: FT, spacing: FT) -> impl Iterator<Item = FT> {
    let num_points = (length / spacing) as usize;
    let offset = (length - (num_points as FT - 1.) * spacing) / 2.;
    (0..num_points).map(move |i| {
        if length != 0. {
            (spacing * i as FT + offset) / length
        } else {
            0.
        }
    })
}

fn fill_segment<const D: usize>(origin: &VF<D>, edge: &VF<D>, spacing: FT, points: &mut Vec<VF<D>>) {
    for param in segment_params(edge.norm(), spacing) {
        points.push(edge * param + origin);
    }
}

/**
 * Fills the parallelotope spanned by `edges` at `origin`: points along the first edge
 * become origins for filling the shape spanned by the remaining edges.
 */
fn fill_parallelotope<const D: usize>(origin: &VF<D>, edges: &[VF<D>], spacing: FT, points: &mut Vec<VF<D>>) {
    match edges {
        [] => {}
        [edge] => fill_segment(origin, edge, spacing, points),
        [first, rest @ ..] => {
            for param in segment_params(first.norm(), spacing) {
                fill_parallelotope(&(first * param + origin), rest, spacing, points);
            }
        }
    }
}

/// Sweeps segments between matching points on the edges v1->v2 and v1->v3.
fn fill_triangle<const D: usize>(v1: &VF<D>, v2: &VF<D>, v3: &VF<D>, spacing: FT, points: &mut Vec<VF<D>>) {
    let edge1 = v2 - v1;
    let edge2 = v3 - v1;
    for param in segment_params(edge1.norm(), spacing) {
        let p1 = edge1 * param + v1;
        let p2 = edge2 * param + v1;
        fill_segment(&p1, &(p2 - p1), spacing, points);
    }
}

/// Keeps the first of every group of bitwise identical points.
fn unify_points<const D: usize>(points: Vec<VF<D>>, seen: &mut HashSet<Vec<u64>>) -> Vec<VF<D>> {
    points
        .into_iter()
        .filter(|p| seen.insert(p.iter().map(|x| x.to_bits() as u64).collect()))
        .collect()
}

fn vector<const D: usize>(values: &[FT], what: impl FnOnce() -> String) -> Result<VF<D>, SceneError> {
    vecf_from_slice::<D>(values).ok_or_else(|| SceneError::VectorLength {
        what: what(),
        len: values.len(),
        dimension: D,
    })
}

fn check_spacing(what: &'static str, value: FT) -> Result<(), SceneError> {
    if value > 0. {
        Ok(())
    } else {
        Err(SceneError::NonPositiveSpacing {
            what,
            value: value as f64,
        })
    }
}

/**
 * Samples the clouds with fluid particles at `particle_spacing` and the obstacles with
 * boundary particles at `boundary_spacing`. Fluid particles start with the cloud velocity,
 * rest density and mass `particle_spacing^3 * rest_density`.
 */
pub fn build_scene<const D: usize>(config: &SceneConfig, params: &SimulationParams) -> Result<Scene<D>, SceneError> {
    check_spacing("particle_spacing", params.particle_spacing)?;
    check_spacing("boundary_spacing", config.boundary_spacing)?;

    let mass = params.particle_mass();
    let mut particles = ParticleVec::<D>::new();
    let mut seen = HashSet::new();

    for (ci, cloud) in config.clouds.iter().enumerate() {
        let origin = vector::<D>(&cloud.origin, || format!("clouds[{}].origin", ci))?;
        let velocity = match &cloud.velocity {
            Some(velocity) => vector::<D>(velocity, || format!("clouds[{}].velocity", ci))?,
            None => VF::<D>::zeros(),
        };
        if cloud.edges.len() != D {
            return Err(SceneError::ShapeArity {
                what: format!("clouds[{}].edges", ci),
                len: cloud.edges.len(),
                expected: D,
                dimension: D,
            });
        }
        let edges = cloud
            .edges
            .iter()
            .enumerate()
            .map(|(ei, edge)| vector::<D>(edge, || format!("clouds[{}].edges[{}]", ci, ei)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut points = Vec::new();
        fill_parallelotope(&origin, &edges, params.particle_spacing, &mut points);
        for position in unify_points(points, &mut seen) {
            particles.add_particle(position, velocity, mass, params.rest_density);
        }
    }

    let mut boundary_points = Vec::new();
    for (oi, obstacle) in config.obstacles.iter().enumerate() {
        let vertices = obstacle
            .vertices
            .iter()
            .enumerate()
            .map(|(vi, vertex)| vector::<D>(vertex, || format!("obstacles[{}].vertices[{}]", oi, vi)))
            .collect::<Result<Vec<_>, _>>()?;

        match (D, vertices.as_slice()) {
            (2, [v1, v2]) => fill_segment(v1, &(v2 - v1), config.boundary_spacing, &mut boundary_points),
            (3, [v1, v2, v3]) => fill_triangle(v1, v2, v3, config.boundary_spacing, &mut boundary_points),
            _ => {
                return Err(SceneError::ShapeArity {
                    what: format!("obstacles[{}].vertices", oi),
                    len: vertices.len(),
                    expected: D,
                    dimension: D,
                })
            }
        }
    }
    let boundary_positions = unify_points(boundary_points, &mut HashSet::new());

    debug!(
        clouds = config.clouds.len(),
        obstacles = config.obstacles.len(),
        fluid_particles = particles.len(),
        boundary_particles = boundary_positions.len(),
        "built scene"
    );

    Ok(Scene {
        particles,
        boundary_positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_parameters::test_params;
    use crate::{vec2f, vec3f};

    fn cloud(origin: Vec<FT>, edges: Vec<Vec<FT>>, velocity: Option<Vec<FT>>) -> CloudConfig {
        CloudConfig {
            origin,
            edges,
            velocity,
        }
    }

    fn params_with_spacing(dimension: usize, spacing: FT) -> SimulationParams {
        let mut params = test_params(dimension);
        params.particle_spacing = spacing;
        params.rest_density = 2.;
        params
    }

    #[test]
    fn segment_points_are_centered() {
        let params = segment_params(1., 0.25).collect::<Vec<_>>();
        assert_eq!(params, vec![0.125, 0.375, 0.625, 0.875]);

        let params = segment_params(1., 0.3).collect::<Vec<_>>();
        assert_eq!(params.len(), 3);
        for (param, expected) in params.iter().zip([0.2, 0.5, 0.8]) {
            crate::assert_ft_approx_eq(*param, expected, 1e-5, || "param".to_string());
        }

        assert_eq!(segment_params(0.2, 0.25).count(), 0);
        assert_eq!(segment_params(0., 0.25).count(), 0);
    }

    #[test]
    fn parallelogram_cloud_2d() {
        let params = params_with_spacing(2, 0.25);
        let config = SceneConfig {
            boundary_spacing: 0.25,
            clouds: vec![cloud(
                vec![1., 0.],
                vec![vec![1., 0.], vec![0., 0.5]],
                Some(vec![0.5, -1.]),
            )],
            obstacles: vec![],
        };

        let scene = build_scene::<2>(&config, &params).unwrap();
        let particles = &scene.particles;
        assert_eq!(particles.len(), 8);
        assert!(scene.boundary_positions.is_empty());

        assert_eq!(particles.position[0], vec2f(1.125, 0.125));
        assert_eq!(particles.position[1], vec2f(1.125, 0.375));
        assert_eq!(particles.position[7], vec2f(1.875, 0.375));
        for i in 0..particles.len() {
            assert_eq!(particles.velocity[i], vec2f(0.5, -1.));
            assert_eq!(particles.interval_velocity[i], vec2f(0.5, -1.));
            assert_eq!(particles.density[i], 2.);
            assert_eq!(particles.interval_density[i], 2.);
            assert_eq!(particles.pressure[i], 0.);
            assert_eq!(particles.mass[i], 0.25 * 0.25 * 0.25 * 2.);
        }
    }

    #[test]
    fn parallelepiped_cloud_3d() {
        let params = params_with_spacing(3, 0.25);
        let config = SceneConfig {
            boundary_spacing: 0.25,
            clouds: vec![cloud(
                vec![0., 0., 0.],
                vec![vec![0.5, 0., 0.], vec![0., 0.5, 0.], vec![0., 0., 1.]],
                None,
            )],
            obstacles: vec![],
        };

        let scene = build_scene::<3>(&config, &params).unwrap();
        assert_eq!(scene.particles.len(), 2 * 2 * 4);
        assert_eq!(scene.particles.position[0], vec3f(0.125, 0.125, 0.125));
        assert!(scene.particles.velocity.iter().all(|v| *v == vec3f(0., 0., 0.)));
        for p in &scene.particles.position {
            assert!(p.x > 0. && p.x < 0.5 && p.y > 0. && p.y < 0.5 && p.z > 0. && p.z < 1.);
        }
    }

    #[test]
    fn coincident_points_are_unified() {
        let params = params_with_spacing(2, 0.25);
        let config = SceneConfig {
            boundary_spacing: 0.25,
            clouds: vec![
                cloud(vec![0., 0.], vec![vec![1., 0.], vec![0., 0.5]], Some(vec![1., 0.])),
                cloud(vec![0., 0.], vec![vec![0., 0.5], vec![1., 0.]], Some(vec![-1., 0.])),
            ],
            obstacles: vec![
                ObstacleConfig {
                    vertices: vec![vec![0., 0.], vec![1., 0.]],
                },
                ObstacleConfig {
                    vertices: vec![vec![1., 0.], vec![0., 0.]],
                },
            ],
        };

        let scene = build_scene::<2>(&config, &params).unwrap();
        assert_eq!(scene.particles.len(), 8);
        // the first cloud wins
        assert!(scene.particles.velocity.iter().all(|v| *v == vec2f(1., 0.)));
        assert_eq!(
            scene.boundary_positions,
            vec![vec2f(0.125, 0.), vec2f(0.375, 0.), vec2f(0.625, 0.), vec2f(0.875, 0.)]
        );
    }

    #[test]
    fn triangle_obstacle_3d() {
        let params = params_with_spacing(3, 0.1);
        let config = SceneConfig {
            boundary_spacing: 0.25,
            clouds: vec![],
            obstacles: vec![ObstacleConfig {
                vertices: vec![vec![0., 0., 0.], vec![1., 0., 0.], vec![0., 1., 0.]],
            }],
        };

        let scene = build_scene::<3>(&config, &params).unwrap();
        // swept segments of length sqrt(2)*{0.125, 0.375, 0.625, 0.875}
        assert_eq!(scene.boundary_positions.len(), 2 + 3 + 4);
        for p in &scene.boundary_positions {
            assert!(p.x >= 0. && p.y >= 0. && p.x + p.y <= 1.);
            assert_eq!(p.z, 0.);
        }
    }

    #[test]
    fn malformed_scenes_are_rejected() {
        let params = params_with_spacing(2, 0.25);
        let good_cloud = cloud(vec![0., 0.], vec![vec![1., 0.], vec![0., 1.]], None);
        let scene_with = |clouds: Vec<CloudConfig>, obstacles: Vec<ObstacleConfig>| SceneConfig {
            boundary_spacing: 0.25,
            clouds,
            obstacles,
        };

        let config = scene_with(vec![cloud(vec![0., 0., 0.], vec![vec![1., 0.], vec![0., 1.]], None)], vec![]);
        assert!(matches!(
            build_scene::<2>(&config, &params),
            Err(SceneError::VectorLength { len: 3, dimension: 2, .. })
        ));

        let config = scene_with(vec![cloud(vec![0., 0.], vec![vec![1., 0.]], None)], vec![]);
        assert!(matches!(
            build_scene::<2>(&config, &params),
            Err(SceneError::ShapeArity { len: 1, expected: 2, .. })
        ));

        let triangle = ObstacleConfig {
            vertices: vec![vec![0., 0.], vec![1., 0.], vec![0., 1.]],
        };
        let config = scene_with(vec![good_cloud.clone()], vec![triangle]);
        let err = build_scene::<2>(&config, &params).unwrap_err();
        assert!(matches!(err, SceneError::ShapeArity { len: 3, expected: 2, .. }));
        assert_eq!(err.to_string(), "obstacles[0].vertices needs 2 entries for a 2D scene but has 3");

        let mut config = scene_with(vec![good_cloud], vec![]);
        config.boundary_spacing = 0.;
        assert!(matches!(
            build_scene::<2>(&config, &params),
            Err(SceneError::NonPositiveSpacing {
                what: "boundary_spacing",
                ..
            })
        ));
    }

    #[test]
    fn scene_config_from_yaml() {
        let yaml = "
boundary_spacing: 0.05
clouds:
  - origin: [0.0, 0.0]
    edges: [[1.0, 0.0], [0.0, 0.5]]
    velocity: [0.0, -0.1]
obstacles:
  - vertices: [[0.0, 0.0], [2.0, 0.0]]
";
        let config: SceneConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.boundary_spacing, 0.05);
        assert_eq!(config.clouds.len(), 1);
        assert_eq!(config.clouds[0].velocity, Some(vec![0.0, -0.1]));
        assert_eq!(config.obstacles[0].vertices[1], vec![2.0, 0.0]);

        let config: SceneConfig = serde_yaml::from_str("boundary_spacing: 0.1").unwrap();
        assert!(config.clouds.is_empty() && config.obstacles.is_empty());
    }
}
