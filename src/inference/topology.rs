//! Standard 33-landmark full-body topology

pub const LANDMARK_COUNT: usize = 33;

pub const LANDMARK_NAMES: [&str; LANDMARK_COUNT] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

/// Skeleton edges as pairs of landmark indices
pub const CONNECTIONS: &[(usize, usize)] = &[
    // face
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    // torso and arms
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    // legs
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_reference_known_landmarks() {
        assert_eq!(CONNECTIONS.len(), 35);
        assert!(CONNECTIONS
            .iter()
            .all(|&(a, b)| a < LANDMARK_COUNT && b < LANDMARK_COUNT && a != b));
    }

    #[test]
    fn landmark_names_are_unique() {
        let mut names = LANDMARK_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), LANDMARK_COUNT);
        assert_eq!(LANDMARK_NAMES[11], "left_shoulder");
    }
}
