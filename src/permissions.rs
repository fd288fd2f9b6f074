// src/permissions.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Roles recognized by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(()),
        }
    }
}

/// Capability tags. One flat set per role, no hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageAdmins,
    ManageCourses,
    ManageQuestions,
    ManageStudents,
    GenerateReports,
    ViewAuditLogs,
    ManageGrades,
    ManageContent,
    ManageTopics,
    ManageBadges,
    ViewAnalytics,
    ViewCourses,
    ViewQuestions,
    ViewStudents,
    ViewReports,
    AnswerQuestions,
    ViewProgress,
    ViewBadges,
    ViewRanking,
}

// admin and super_admin carry the same set today. That is data, not a derived
// relationship, so both are enumerated independently.
const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ManageAdmins,
    Permission::ManageCourses,
    Permission::ManageQuestions,
    Permission::ManageStudents,
    Permission::GenerateReports,
    Permission::ViewAuditLogs,
    Permission::ManageGrades,
    Permission::ManageContent,
    Permission::ManageTopics,
    Permission::ManageBadges,
    Permission::ViewAnalytics,
];

const SUPER_ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ManageAdmins,
    Permission::ManageCourses,
    Permission::ManageQuestions,
    Permission::ManageStudents,
    Permission::GenerateReports,
    Permission::ViewAuditLogs,
    Permission::ManageGrades,
    Permission::ManageContent,
    Permission::ManageTopics,
    Permission::ManageBadges,
    Permission::ViewAnalytics,
];

const TEACHER_PERMISSIONS: &[Permission] = &[
    Permission::ViewCourses,
    Permission::ViewQuestions,
    Permission::ViewStudents,
    Permission::ViewReports,
    Permission::ViewAnalytics,
    Permission::ManageContent,
    Permission::ManageTopics,
];

const STUDENT_PERMISSIONS: &[Permission] = &[
    Permission::ViewCourses,
    Permission::AnswerQuestions,
    Permission::ViewProgress,
    Permission::ViewBadges,
    Permission::ViewRanking,
];

/// The statically configured permission set for a role.
pub fn permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::SuperAdmin => SUPER_ADMIN_PERMISSIONS,
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Teacher => TEACHER_PERMISSIONS,
        Role::Student => STUDENT_PERMISSIONS,
    }
}

/// Succeeds iff every required permission is present in the role's set.
pub fn authorize(role: Role, required: &[Permission]) -> bool {
    let granted = permissions(role);
    required.iter().all(|p| granted.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_can_manage_questions() {
        assert!(authorize(Role::Admin, &[Permission::ManageQuestions]));
        assert!(authorize(
            Role::Admin,
            &[Permission::ManageQuestions, Permission::ManageStudents]
        ));
    }

    #[test]
    fn student_cannot_manage_questions() {
        assert!(!authorize(Role::Student, &[Permission::ManageQuestions]));
        // One missing permission fails the whole check.
        assert!(!authorize(
            Role::Student,
            &[Permission::AnswerQuestions, Permission::ManageQuestions]
        ));
    }

    #[test]
    fn every_granted_permission_authorizes() {
        for role in [Role::SuperAdmin, Role::Admin, Role::Teacher, Role::Student] {
            for p in permissions(role) {
                assert!(authorize(role, &[*p]));
            }
        }
    }

    #[test]
    fn admin_and_super_admin_sets_match() {
        assert_eq!(permissions(Role::Admin), permissions(Role::SuperAdmin));
    }

    #[test]
    fn unknown_role_does_not_parse() {
        assert!(Role::from_str("grader").is_err());
        assert_eq!(Role::from_str("teacher"), Ok(Role::Teacher));
    }
}
