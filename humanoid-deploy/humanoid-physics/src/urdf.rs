use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra as na;
use rapier3d::prelude::*;
use roxmltree::{Document, Node};

use crate::world::PhysicsWorld;
use crate::PhysicsError;

const DEFAULT_DENSITY: f32 = 1000.0;

/// Revolute joint driven by equal and opposite torques on its two bodies.
#[derive(Clone, Debug)]
pub(crate) struct ActuatedJoint {
    pub name: String,
    pub parent: RigidBodyHandle,
    pub child: RigidBodyHandle,
    /// Rotation of the joint frame relative to the parent body at zero angle.
    pub origin_rotation: na::UnitQuaternion<f32>,
    /// Rotation axis, in the joint (child) frame.
    pub axis: na::Unit<na::Vector3<f32>>,
    pub effort_limit: Option<f32>,
}

pub(crate) struct RobotModel {
    pub root: RigidBodyHandle,
    /// Every created body, in document order.
    pub bodies: Vec<(String, RigidBodyHandle)>,
    /// Actuated joints, in actuation order.
    pub joints: Vec<ActuatedJoint>,
}

struct JointXml {
    name: String,
    kind: String,
    parent: String,
    child: String,
    origin: Isometry<f32>,
    axis: na::Vector3<f32>,
    limits: Option<[f32; 2]>,
    effort: Option<f32>,
}

pub(crate) struct UrdfLoader;

impl UrdfLoader {
    /// Builds the robot into `world` with the root link floating at
    /// `base_height` and every joint at zero angle.
    ///
    /// `joint_order` selects and orders the actuated joints; `None` keeps the
    /// document order of revolute and continuous joints.
    pub fn load_robot(
        world: &mut PhysicsWorld,
        urdf_content: &str,
        base_height: f32,
        joint_order: Option<&[String]>,
    ) -> Result<RobotModel, PhysicsError> {
        let doc = Document::parse(urdf_content)?;

        // 1. Parse links and joints
        let links_xml: Vec<Node> = doc
            .descendants()
            .filter(|n| n.has_tag_name("link") && n.attribute("name").is_some())
            .collect();
        let joints_xml: Vec<JointXml> = doc
            .descendants()
            .filter(|n| n.has_tag_name("joint"))
            .filter_map(parse_joint)
            .collect();

        let children: HashSet<&str> = joints_xml.iter().map(|j| j.child.as_str()).collect();
        let root = links_xml
            .iter()
            .filter_map(|n| n.attribute("name"))
            .find(|name| !children.contains(name))
            .ok_or(PhysicsError::NoRoot)?
            .to_string();

        let mut adjacency: HashMap<&str, Vec<&JointXml>> = HashMap::new();
        for joint in &joints_xml {
            adjacency.entry(joint.parent.as_str()).or_default().push(joint);
        }

        // 2. Traversal to compute global poses at zero joint angles
        let mut global_poses: HashMap<String, Isometry<f32>> = HashMap::new();
        let mut traversal: Vec<&JointXml> = Vec::new();
        global_poses.insert(
            root.clone(),
            Isometry::translation(0.0, 0.0, base_height),
        );

        let mut queue = VecDeque::new();
        queue.push_back(root.clone());
        while let Some(parent_name) = queue.pop_front() {
            let Some(parent_pose) = global_poses.get(&parent_name).copied() else {
                continue;
            };
            for &joint in adjacency.get(parent_name.as_str()).into_iter().flatten() {
                if global_poses.contains_key(&joint.child) {
                    continue;
                }
                global_poses.insert(joint.child.clone(), parent_pose * joint.origin);
                traversal.push(joint);
                queue.push_back(joint.child.clone());
            }
        }

        // 3. Create rigid bodies and colliders
        let mut bodies = Vec::new();
        for node in &links_xml {
            let Some(name) = node.attribute("name") else {
                continue;
            };
            let Some(pose) = global_poses.get(name).copied() else {
                log::warn!("link `{}` is not connected to `{}`, skipping", name, root);
                continue;
            };

            let rb = RigidBodyBuilder::dynamic().position(pose).build();
            let handle = world.rigid_body_set.insert(rb);
            bodies.push((name.to_string(), handle));
            world.link_map.insert(name.to_string(), handle);

            let collider = link_collider(node);
            world
                .collider_set
                .insert_with_parent(collider, handle, &mut world.rigid_body_set);
        }

        // 4. Create joints in traversal order
        let mut actuated = Vec::new();
        for joint in traversal {
            let (Some(&p_handle), Some(&c_handle)) = (
                world.link_map.get(&joint.parent),
                world.link_map.get(&joint.child),
            ) else {
                continue;
            };

            match joint.kind.as_str() {
                "revolute" | "continuous" => {
                    let axis = na::Unit::new_normalize(joint.axis);
                    let axis_on_parent = joint.origin.rotation * axis;

                    let mut builder = GenericJointBuilder::new(JointAxesMask::LOCKED_REVOLUTE_AXES)
                        .local_frame1(joint.origin)
                        .local_frame2(Isometry::identity())
                        .local_axis1(axis_on_parent)
                        .local_axis2(axis)
                        .contacts_enabled(false);
                    if let (Some(limits), "revolute") = (joint.limits, joint.kind.as_str()) {
                        builder = builder.limits(JointAxis::AngX, limits);
                    }
                    world
                        .impulse_joint_set
                        .insert(p_handle, c_handle, builder.build(), true);

                    actuated.push(ActuatedJoint {
                        name: joint.name.clone(),
                        parent: p_handle,
                        child: c_handle,
                        origin_rotation: joint.origin.rotation,
                        axis,
                        effort_limit: joint.effort,
                    });
                }
                other => {
                    if other != "fixed" {
                        log::warn!("joint `{}` has unsupported type `{}`, locking it", joint.name, other);
                    }
                    let fixed = GenericJointBuilder::new(JointAxesMask::LOCKED_FIXED_AXES)
                        .local_frame1(joint.origin)
                        .local_frame2(Isometry::identity())
                        .contacts_enabled(false)
                        .build();
                    world.impulse_joint_set.insert(p_handle, c_handle, fixed, true);
                }
            }
        }

        let joints = order_joints(actuated, joint_order)?;
        if joints.is_empty() {
            return Err(PhysicsError::NoJoints);
        }

        let root = world.link_map.get(&root).copied().ok_or(PhysicsError::NoRoot)?;
        Ok(RobotModel { root, bodies, joints })
    }
}

fn order_joints(
    joints: Vec<ActuatedJoint>,
    joint_order: Option<&[String]>,
) -> Result<Vec<ActuatedJoint>, PhysicsError> {
    let Some(order) = joint_order else {
        return Ok(joints);
    };
    order
        .iter()
        .map(|name| {
            joints
                .iter()
                .find(|j| &j.name == name)
                .cloned()
                .ok_or_else(|| PhysicsError::UnknownJoint(name.clone()))
        })
        .collect()
}

fn parse_joint(node: Node) -> Option<JointXml> {
    let name = node.attribute("name")?;
    let kind = node.attribute("type")?;
    let child_attr = |tag: &str| {
        node.children()
            .find(|n| n.has_tag_name(tag))
            .and_then(|n| n.attribute("link"))
    };
    let parent = child_attr("parent")?;
    let child = child_attr("child")?;

    let origin = parse_urdf_origin(node.children().find(|n| n.has_tag_name("origin")));
    let axis = node
        .children()
        .find(|n| n.has_tag_name("axis"))
        .and_then(|n| n.attribute("xyz"))
        .and_then(parse_vec3)
        .unwrap_or_else(na::Vector3::x);

    let limit = node.children().find(|n| n.has_tag_name("limit"));
    let parse_attr = |attr: &str| limit.and_then(|n| n.attribute(attr)).and_then(|s| s.parse::<f32>().ok());
    let limits = match (parse_attr("lower"), parse_attr("upper")) {
        (Some(lower), Some(upper)) if lower < upper => Some([lower, upper]),
        _ => None,
    };

    Some(JointXml {
        name: name.to_string(),
        kind: kind.to_string(),
        parent: parent.to_string(),
        child: child.to_string(),
        origin,
        axis,
        limits,
        effort: parse_attr("effort").filter(|e| *e > 0.0),
    })
}

/// Collider for a link: its collision shape when present, otherwise a small
/// non-colliding ball that only carries the link mass.
fn link_collider(node: &Node) -> Collider {
    // Robot = group 2, ground = group 1. No self-collisions.
    let robot_groups = InteractionGroups::new(Group::GROUP_2, Group::GROUP_1);

    let mass = node
        .children()
        .find(|n| n.has_tag_name("inertial"))
        .and_then(|n| n.children().find(|c| c.has_tag_name("mass")))
        .and_then(|n| n.attribute("value"))
        .and_then(|s| s.parse::<f32>().ok())
        .filter(|m| *m > 0.0);

    let shape = node.children().find(|n| n.has_tag_name("collision")).and_then(|collision| {
        let col_origin = parse_urdf_origin(collision.children().find(|n| n.has_tag_name("origin")));
        let geometry = collision.children().find(|n| n.has_tag_name("geometry"))?;
        collision_shape(geometry, col_origin)
    });

    let builder = match shape {
        Some(builder) => builder.friction(1.0).collision_groups(robot_groups),
        None => ColliderBuilder::ball(0.02).collision_groups(InteractionGroups::none()),
    };

    match mass {
        Some(mass) => builder.mass(mass).build(),
        None => builder.density(DEFAULT_DENSITY).build(),
    }
}

fn collision_shape(geometry: Node, origin: Isometry<f32>) -> Option<ColliderBuilder> {
    let shape = geometry.children().find(|n| n.is_element())?;
    let attr = |name: &str| shape.attribute(name).and_then(|s| s.parse::<f32>().ok());

    let builder = match shape.tag_name().name() {
        "box" => {
            let dims = shape.attribute("size").and_then(parse_vec3)?;
            ColliderBuilder::cuboid(dims.x / 2.0, dims.y / 2.0, dims.z / 2.0).position(origin)
        }
        "sphere" => ColliderBuilder::ball(attr("radius")?).position(origin),
        "cylinder" => {
            // URDF cylinders run along z, Rapier cylinders along y.
            let to_z = Isometry::rotation(vector![std::f32::consts::FRAC_PI_2, 0.0, 0.0]);
            ColliderBuilder::cylinder(attr("length")? / 2.0, attr("radius")?).position(origin * to_z)
        }
        // Meshes are approximated by a contact ball at the link origin.
        "mesh" => ColliderBuilder::ball(0.04).position(origin),
        _ => return None,
    };
    Some(builder)
}

fn parse_vec3(s: &str) -> Option<na::Vector3<f32>> {
    let v: Vec<f32> = s.split_whitespace().filter_map(|s| s.parse().ok()).collect();
    (v.len() == 3).then(|| na::Vector3::new(v[0], v[1], v[2]))
}

fn parse_urdf_origin(node: Option<Node>) -> Isometry<f32> {
    let xyz = node
        .and_then(|n| n.attribute("xyz"))
        .and_then(parse_vec3)
        .unwrap_or_else(na::Vector3::zeros);
    let rpy = node
        .and_then(|n| n.attribute("rpy"))
        .and_then(parse_vec3)
        .unwrap_or_else(na::Vector3::zeros);

    Isometry::from_parts(
        Translation::from(xyz),
        na::UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z),
    )
}
