/**
 * Turns marker centroids into the robot's pose and where the target is
 * relative to it. Everything is in image pixels; angles are counter-clockwise
 * positive even though image rows grow downward.
 */
pub type Degrees = f32;
pub type Radians = f32;
pub type Pixels = f32;


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point2D {
    pub u: Pixels,
    pub v: Pixels,
}


impl Point2D {
    pub fn new(u: Pixels, v: Pixels) -> Point2D {
        Point2D { u: u, v: v }
    }

    fn is_finite(&self) -> bool {
        self.u.is_finite() && self.v.is_finite()
    }
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub center: Point2D,
    /// None when the front and rear markers sit on the same pixel.
    pub heading: Option<Radians>,
}


/// What the detector saw this frame. Any of these can be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MarkerObservations {
    pub front: Option<Point2D>,
    pub rear: Option<Point2D>,
    pub target: Option<Point2D>,
}


/// Bearing and distance to the target, both known.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetFix {
    pub bearing_d: Degrees,
    pub distance_px: Pixels,
}


#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Geometry {
    pub pose: Option<Pose>,
    pub target: Option<Point2D>,
    pub distance_px: Option<Pixels>,
    pub bearing_d: Option<Degrees>,
}


impl Geometry {
    pub fn target_fix(&self) -> Option<TargetFix> {
        match (self.bearing_d, self.distance_px) {
            (Some(bearing_d), Some(distance_px)) => Some(TargetFix {
                bearing_d: bearing_d,
                distance_px: distance_px,
            }),
            _ => None,
        }
    }
}


/**
 * Normalizes an angle into (-180, 180]. NaN stays NaN.
 */
pub fn normalize_degrees(degrees: Degrees) -> Degrees {
    let mut normalized = degrees % 360.0;
    if normalized <= -180.0 {
        normalized += 360.0;
    } else if normalized > 180.0 {
        normalized -= 360.0;
    }
    normalized
}


/**
 * Angle of the vector from `from` to `to`, in the mathematical convention.
 */
fn image_angle(from: &Point2D, to: &Point2D) -> Radians {
    (-(to.v - from.v)).atan2(to.u - from.u)
}


fn finite(point: Option<Point2D>) -> Option<Point2D> {
    point.filter(|p| p.is_finite())
}


pub fn estimate_pose(front: Option<Point2D>, rear: Option<Point2D>) -> Option<Pose> {
    let (front, rear) = match (finite(front), finite(rear)) {
        (Some(front), Some(rear)) => (front, rear),
        _ => return None,
    };
    let center = Point2D::new((front.u + rear.u) * 0.5, (front.v + rear.v) * 0.5);
    let heading = if front == rear {
        None
    } else {
        Some(image_angle(&rear, &front))
    };
    Some(Pose {
        center: center,
        heading: heading,
    })
}


/**
 * Computes the pose and the bearing and distance to the target. Missing
 * inputs give missing outputs; this never fails.
 */
pub fn estimate(observations: &MarkerObservations) -> Geometry {
    let pose = estimate_pose(observations.front, observations.rear);
    let target = finite(observations.target);

    let mut geometry = Geometry {
        pose: pose,
        target: target,
        distance_px: None,
        bearing_d: None,
    };

    if let (Some(pose), Some(target)) = (pose, target) {
        let distance = (target.u - pose.center.u).hypot(target.v - pose.center.v);
        let world = image_angle(&pose.center, &target);
        let relative = match pose.heading {
            Some(heading) => world - heading,
            None => world,
        };
        let bearing = normalize_degrees(relative.to_degrees());
        if distance.is_finite() && bearing.is_finite() {
            geometry.distance_px = Some(distance);
            geometry.bearing_d = Some(bearing);
        }
    }
    geometry
}


/// Heading in degrees, mostly for log lines.
pub fn heading_degrees(pose: &Pose) -> Option<Degrees> {
    pose.heading.map(|h| normalize_degrees(h.to_degrees()))
}
