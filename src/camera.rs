/// Radians of rotation per frame counter tick, about both X and Y.
pub const ROTATION_SPEED: f32 = 0.01;

pub trait Camera {
    fn view_matrix(&self) -> &glam::Mat4;
    fn proj_matrix(&self) -> &glam::Mat4;
}

/// Camera parked at a fixed eye point looking at the origin.
#[derive(Debug, Clone)]
pub struct FixedCamera {
    pub eye: glam::Vec3,
    pub target: glam::Vec3,
    pub up: glam::Vec3,
    view_matrix: glam::Mat4,
    proj_matrix: glam::Mat4,
    z_near: f32,
    z_far: f32,
    aspect: f32,
    fovy: f32,
}

impl Camera for FixedCamera {
    fn view_matrix(&self) -> &glam::Mat4 {
        &self.view_matrix
    }
    fn proj_matrix(&self) -> &glam::Mat4 {
        &self.proj_matrix
    }
}

impl Default for FixedCamera {
    fn default() -> Self {
        let z_near = 0.01;
        let z_far = 100.0;
        let aspect = 16.0 / 9.0;
        let fovy = 60_f32.to_radians();
        let eye = glam::Vec3::new(0.0, 0.0, 10.0);
        let target = glam::Vec3::ZERO;
        let up = glam::Vec3::Y;
        Self {
            eye,
            target,
            up,
            view_matrix: glam::Mat4::look_at_rh(eye, target, up),
            proj_matrix: glam::Mat4::perspective_rh(fovy, aspect, z_near, z_far),
            z_near,
            z_far,
            aspect,
            fovy,
        }
    }
}

impl FixedCamera {
    pub fn for_resolution(width: u32, height: u32) -> Self {
        let mut cam = Self::default();
        cam.update_aspect(glam::UVec2::new(width, height));
        cam
    }

    pub fn update_aspect(&mut self, window_size: glam::UVec2) {
        self.aspect = if window_size.x == 0 || window_size.y == 0 {
            1.0
        } else {
            window_size.x as f32 / window_size.y as f32
        };
        self.proj_matrix = glam::Mat4::perspective_rh(self.fovy, self.aspect, self.z_near, self.z_far);
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> f32 {
        self.fovy
    }
}

/// Rotation angles `(x, y)` in radians for a frame counter value.
pub fn rotation_angles(counter: u32) -> (f32, f32) {
    let angle = counter as f32 * ROTATION_SPEED;
    (angle, angle)
}

/// Model transform for a frame counter value: rotate about X, then about Y.
pub fn model_transform(counter: u32) -> glam::Mat4 {
    let (x, y) = rotation_angles(counter);
    glam::Mat4::from_rotation_y(y) * glam::Mat4::from_rotation_x(x)
}
