use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "ktether",
    version,
    about = "Redirect a Kubernetes workload to your local machine."
)]
pub struct CliArgs {
    /// Name of the pod or service to redirect (picked interactively when omitted)
    #[arg(long)]
    pub name: Option<String>,

    /// Namespace of the target; must match the active kubeconfig context
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Target kind (pod or service)
    #[arg(short, long, default_value = "service")]
    pub kind: String,

    /// Why the redirection is being prepared (recorded in the session report)
    #[arg(long, default_value = "debug")]
    pub reason: String,

    /// Descriptor output format (yaml or json)
    #[arg(short, long, default_value = "yaml")]
    pub output: String,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,
}
