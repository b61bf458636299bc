//! Object kinds a customization spec can declare.

use cmpkit::client::path_segment;
use cmpkit::subsystem;

/// Sections in the order they are applied.
pub const SECTION_ORDER: [&str; 5] = ["auth", "oauth2", "resource", "service", "ssh"];

/// How one kind of CMP object is read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind {
    pub section: &'static str,
    pub name: &'static str,
    /// `section.name`, the resource type shown in diffs.
    pub label: &'static str,
    pub subsystem: &'static str,
    /// Collection path; objects live at `collection/<name>`.
    pub collection: &'static str,
    /// Key wrapping the object in request and response bodies.
    pub body_key: &'static str,
    /// Fields sent on create but never compared.
    pub write_only: &'static [&'static str],
    /// Association lists managed with append/remove updates.
    pub relations: &'static [&'static str],
}

impl Kind {
    pub fn item_path(&self, name: &str) -> String {
        format!("{}/{}", self.collection, path_segment(name))
    }

    pub fn is_relation(&self, field: &str) -> bool {
        self.relations.contains(&field)
            || field
                .strip_prefix("remove_")
                .is_some_and(|r| self.relations.contains(&r))
    }
}

pub const KINDS: &[Kind] = &[
    Kind {
        section: "auth",
        name: "roles",
        label: "auth.roles",
        subsystem: subsystem::AUTH,
        collection: "/v1.0/nas/roles",
        body_key: "role",
        write_only: &[],
        relations: &[],
    },
    Kind {
        section: "auth",
        name: "users",
        label: "auth.users",
        subsystem: subsystem::AUTH,
        collection: "/v1.0/nas/users",
        body_key: "user",
        write_only: &["password"],
        relations: &["roles"],
    },
    Kind {
        section: "auth",
        name: "groups",
        label: "auth.groups",
        subsystem: subsystem::AUTH,
        collection: "/v1.0/nas/groups",
        body_key: "group",
        write_only: &[],
        relations: &["roles", "users"],
    },
    Kind {
        section: "oauth2",
        name: "scopes",
        label: "oauth2.scopes",
        subsystem: subsystem::AUTH,
        collection: "/v1.0/oauth2/scopes",
        body_key: "scope",
        write_only: &[],
        relations: &[],
    },
    Kind {
        section: "oauth2",
        name: "clients",
        label: "oauth2.clients",
        subsystem: subsystem::AUTH,
        collection: "/v1.0/oauth2/clients",
        body_key: "client",
        write_only: &["private_key"],
        relations: &[],
    },
    Kind {
        section: "resource",
        name: "containers",
        label: "resource.containers",
        subsystem: subsystem::RESOURCE,
        collection: "/v1.0/nrs/containers",
        body_key: "resourcecontainer",
        write_only: &["conn"],
        relations: &[],
    },
    Kind {
        section: "service",
        name: "definitions",
        label: "service.definitions",
        subsystem: subsystem::SERVICE,
        collection: "/v1.0/nws/servicedefs",
        body_key: "servicedef",
        write_only: &[],
        relations: &[],
    },
    Kind {
        section: "service",
        name: "catalogs",
        label: "service.catalogs",
        subsystem: subsystem::SERVICE,
        collection: "/v1.0/nws/srvcatalogs",
        body_key: "catalog",
        write_only: &[],
        relations: &["definitions"],
    },
    Kind {
        section: "ssh",
        name: "groups",
        label: "ssh.groups",
        subsystem: subsystem::SSH,
        collection: "/v1.0/gas/sshgroups",
        body_key: "sshgroup",
        write_only: &[],
        relations: &[],
    },
    Kind {
        section: "ssh",
        name: "keys",
        label: "ssh.keys",
        subsystem: subsystem::SSH,
        collection: "/v1.0/gas/sshkeys",
        body_key: "sshkey",
        write_only: &["priv_key"],
        relations: &[],
    },
    Kind {
        section: "ssh",
        name: "nodes",
        label: "ssh.nodes",
        subsystem: subsystem::SSH,
        collection: "/v1.0/gas/sshnodes",
        body_key: "sshnode",
        write_only: &[],
        relations: &[],
    },
];

pub fn find(section: &str, name: &str) -> Option<&'static Kind> {
    KINDS.iter().find(|k| k.section == section && k.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_match_section_and_name() {
        for kind in KINDS {
            assert_eq!(kind.label, format!("{}.{}", kind.section, kind.name));
            assert!(SECTION_ORDER.contains(&kind.section));
        }
    }

    #[test]
    fn test_relations() {
        let users = find("auth", "users").unwrap();
        assert!(users.is_relation("roles"));
        assert!(users.is_relation("remove_roles"));
        assert!(!users.is_relation("desc"));
        assert_eq!(users.item_path("u@dom"), "/v1.0/nas/users/u%40dom");
        assert_eq!(users.item_path("ops/admins"), "/v1.0/nas/users/ops%2Fadmins");
        assert!(find("auth", "tokens").is_none());
    }
}
