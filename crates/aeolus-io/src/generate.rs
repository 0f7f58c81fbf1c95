use aeolus_geom::Vec3;
use aeolus_mesh::stl::write_stl_binary;
use aeolus_mesh::{Mesh, MeshFormat};
use aeolus_runtime::{GenerationServiceError, GeometryGenerationService, GeometryParams, MeshBlob};

/// Local stand-in for the parametric massing model: a solid block with a
/// `width` x `depth` footprint (along X and Y) rising `height` from z = 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct BoxGenerator;

impl BoxGenerator {
    pub fn block(params: &GeometryParams) -> Result<Mesh, GenerationServiceError> {
        params.validate()?;
        let (w, d, h) = (
            params.width as f32,
            params.depth as f32,
            params.height as f32,
        );
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(w, 0.0, 0.0),
            Vec3::new(w, d, 0.0),
            Vec3::new(0.0, d, 0.0),
            Vec3::new(0.0, 0.0, h),
            Vec3::new(w, 0.0, h),
            Vec3::new(w, d, h),
            Vec3::new(0.0, d, h),
        ];
        // outward winding
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        Mesh::new(vertices, faces).map_err(|e| GenerationServiceError::Failed(e.to_string()))
    }
}

impl GeometryGenerationService for BoxGenerator {
    fn generate(&self, params: &GeometryParams) -> Result<MeshBlob, GenerationServiceError> {
        let mesh = Self::block(params)?;
        let mut bytes = Vec::with_capacity(84 + 50 * mesh.face_count());
        let header = format!(
            "aeolus block {}x{}x{}",
            params.width, params.depth, params.height
        );
        write_stl_binary(&mesh, &mut bytes, Some(&header))?;
        Ok(MeshBlob::new(bytes, MeshFormat::Stl))
    }
}
