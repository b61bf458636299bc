//! Fixed command sequences run by `ssh ops <operation>`.

/// One command of an operation.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub cmd: &'static str,
    /// A non-zero status is recorded but does not stop the sequence.
    pub no_result_ok: bool,
}

const fn step(cmd: &'static str) -> Step {
    Step {
        cmd,
        no_result_ok: false,
    }
}

const fn tolerant(cmd: &'static str) -> Step {
    Step {
        cmd,
        no_result_ok: true,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Operation {
    pub name: &'static str,
    pub help: &'static str,
    pub steps: &'static [Step],
}

pub const OPERATIONS: &[Operation] = &[
    Operation {
        name: "check_disk_rw",
        help: "Check disk usage and that the root filesystem is writable",
        steps: &[
            step("df -k"),
            step("dd if=/dev/zero of=/var/tmp/.beehive-probe bs=4k count=1 && rm -f /var/tmp/.beehive-probe"),
        ],
    },
    Operation {
        name: "check_uptime",
        help: "Show uptime and load",
        steps: &[step("uptime")],
    },
    Operation {
        name: "check_memory",
        help: "Show memory and swap usage",
        steps: &[step("free -m"), tolerant("swapon --show")],
    },
    Operation {
        name: "check_services",
        help: "List failed systemd units",
        steps: &[step("systemctl is-system-running"), tolerant("systemctl --failed --no-legend")],
    },
    Operation {
        name: "check_time",
        help: "Check clock synchronisation",
        steps: &[step("date -u"), tolerant("timedatectl show -p NTPSynchronized")],
    },
    Operation {
        name: "check_kernel",
        help: "Show kernel and distribution release",
        steps: &[step("uname -r"), tolerant("cat /etc/os-release")],
    },
];

pub fn find(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|op| op.name == name)
}
