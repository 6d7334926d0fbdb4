//! Fixed shell scripts for each remote bootstrap phase
//!
//! Each script is piped to `bash -s` over one SSH session. The sequence is
//! the same on every node: container runtime, then cluster tooling, then the
//! role-specific init or join step.

/// Pinned Kubernetes package repository minor version
pub(crate) const KUBERNETES_VERSION: &str = "v1.30";

/// Pinned flannel release applied as the pod network add-on
pub(crate) const FLANNEL_VERSION: &str = "v0.25.5";

/// Install and configure containerd, plus the kubeadm preflight settings
/// (swap off, bridged traffic visible to iptables).
pub(crate) const RUNTIME_INSTALL: &str = r#"set -euo pipefail
sudo apt-get update -q
sudo apt-get install -y containerd apt-transport-https ca-certificates curl gpg
sudo mkdir -p /etc/containerd
containerd config default | sudo tee /etc/containerd/config.toml >/dev/null
sudo sed -i 's/SystemdCgroup = false/SystemdCgroup = true/' /etc/containerd/config.toml
sudo systemctl restart containerd
sudo systemctl enable containerd
sudo swapoff -a
echo 'net.bridge.bridge-nf-call-iptables = 1' | sudo tee /etc/sysctl.d/99-kubernetes.conf >/dev/null
echo 'net.ipv4.ip_forward = 1' | sudo tee -a /etc/sysctl.d/99-kubernetes.conf >/dev/null
sudo modprobe br_netfilter
sudo sysctl --system >/dev/null
"#;

/// Install kubeadm, kubelet, and kubectl from the pinned package repository
pub(crate) fn tools_install() -> String {
    format!(
        r#"set -euo pipefail
sudo mkdir -p /etc/apt/keyrings
curl -fsSL https://pkgs.k8s.io/core:/stable:/{version}/deb/Release.key | sudo gpg --dearmor --yes -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg
echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/{version}/deb/ /' | sudo tee /etc/apt/sources.list.d/kubernetes.list >/dev/null
sudo apt-get update -q
sudo apt-get install -y kubelet kubeadm kubectl
sudo apt-mark hold kubelet kubeadm kubectl
"#,
        version = KUBERNETES_VERSION
    )
}

/// Initialize the control plane and set up kubectl for the remote user
pub(crate) fn control_plane_init(pod_network_cidr: &str) -> String {
    format!(
        r#"set -euo pipefail
sudo kubeadm init --pod-network-cidr={pod_network_cidr}
mkdir -p "$HOME/.kube"
sudo cp /etc/kubernetes/admin.conf "$HOME/.kube/config"
sudo chown "$(id -u):$(id -g)" "$HOME/.kube/config"
"#
    )
}

/// Apply the pod network add-on; later readiness waits depend on it
pub(crate) fn pod_network_install() -> String {
    format!(
        "set -euo pipefail\nkubectl apply -f https://github.com/flannel-io/flannel/releases/download/{}/kube-flannel.yml\n",
        FLANNEL_VERSION
    )
}

/// Print the join command for workers; run on the control plane after init
pub(crate) const PRINT_JOIN_COMMAND: &str = "sudo kubeadm token create --print-join-command";

/// Read the cluster admin kubeconfig; run on the control plane
pub(crate) const READ_ADMIN_KUBECONFIG: &str = "sudo cat /etc/kubernetes/admin.conf";

/// Join a worker using the command published by the control plane
pub(crate) fn worker_join(join_command: &str) -> String {
    format!("set -euo pipefail\nsudo {}\n", join_command)
}
