use alloy::{dyn_abi::DynSolValue, primitives::Address};
use anyhow::{Context, Result, anyhow, ensure};
use clap::{Args, Parser, Subcommand};
use directories::ProjectDirs;
use ouf_deploy::{
    DEPLOYER_ACCOUNT,
    artifacts::ArtifactStore,
    chain::{NamedAccounts, RpcDeployer, parse_private_key},
    config::{
        API_KEY_ENV, ExplorerConfig, NetworkConfig, ResolvedNetwork, builtin_networks,
        resolve_network,
    },
    console::ConsoleReporter,
    deploy::{DeployScript, Deployment, Environment, TokioDelay},
    error::{ConfigError, DeployError},
    explorer::ExplorerVerifier,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{
    collections::BTreeMap,
    fs,
    io::IsTerminal,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

const APP_QUALIFIER: &str = "xyz";
const APP_ORGANIZATION: &str = "Ouf";
const APP_NAME: &str = "ouf-deploy";

const DEFAULT_NETWORK: &str = "localhost";

#[derive(Debug, Parser)]
#[command(name = "ouf-deploy", version, about)]
struct Cli {
    /// Directory holding networks, named accounts and deployment records.
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deploy OufGovernanceToken and verify it on Arbiscan when on arbitrum-sepolia.
    Deploy(DeployArgs),
    /// Set mutable configuration values.
    Set(SetArgs),
    /// Show configured networks, named accounts and recorded deployments.
    ShowState,
}

#[derive(Debug, Args)]
struct DeployArgs {
    /// Network to deploy to; defaults to the configured default network.
    #[arg(long)]
    network: Option<String>,
    /// Only run deploy scripts carrying one of these tags.
    #[arg(long, value_delimiter = ',')]
    tags: Vec<String>,
    /// Root of the compiled contract artifacts.
    #[arg(long, default_value = "artifacts", value_name = "DIR")]
    artifacts: PathBuf,
    /// Explorer API key, used when the network config has none.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    explorer_api_key: Option<String>,
}

#[derive(Debug, Args)]
struct SetArgs {
    #[command(subcommand)]
    command: SetCommand,
}

#[derive(Debug, Subcommand)]
enum SetCommand {
    /// Add or replace a named network.
    Network(NetworkArgs),
    /// Network used when `deploy` gets no `--network`.
    DefaultNetwork { name: String },
    /// Store a named account, e.g. `deployer`.
    Account {
        name: String,
        #[arg(long)]
        private_key: String,
    },
}

#[derive(Debug, Args)]
struct NetworkArgs {
    name: String,
    #[arg(long)]
    rpc_url: String,
    #[arg(long)]
    chain_id: Option<u64>,
    /// Etherscan-compatible API endpoint used for verification.
    #[arg(long)]
    explorer_api_url: Option<String>,
    #[arg(long, requires = "explorer_api_url")]
    explorer_api_key: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AppState {
    default_network: Option<String>,
    #[serde(default)]
    networks: BTreeMap<String, NetworkConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccountRecord {
    name: String,
    address: String,
    private_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeploymentRecord {
    contract_name: String,
    network: String,
    address: String,
    deployer: String,
    transaction_hash: String,
    block_number: Option<u64>,
    gas_used: u64,
    constructor_args: Vec<String>,
    tags: Vec<String>,
    verification: String,
    deployed_at_unix_secs: u64,
}

impl DeploymentRecord {
    fn new(network: &str, script: &DeployScript, deployment: &Deployment) -> Result<Self> {
        Ok(Self {
            contract_name: deployment.request.contract_name.clone(),
            network: network.to_string(),
            address: deployment.result.address.to_string(),
            deployer: deployment.request.deployer.to_string(),
            transaction_hash: deployment.result.transaction.transaction_hash.to_string(),
            block_number: deployment.result.transaction.block_number,
            gas_used: deployment.result.transaction.gas_used,
            constructor_args: deployment
                .request
                .constructor_args
                .iter()
                .map(format_arg)
                .collect(),
            tags: script.tags.clone(),
            verification: deployment.verification.to_string(),
            deployed_at_unix_secs: unix_time_secs()?,
        })
    }
}

struct Db {
    root_dir: PathBuf,
    accounts_dir: PathBuf,
    deployments_dir: PathBuf,
    state_path: PathBuf,
    state: AppState,
}

impl Db {
    fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let root_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        let accounts_dir = root_dir.join("accounts");
        let deployments_dir = root_dir.join("deployments");
        let state_path = root_dir.join("state.json");

        fs::create_dir_all(&accounts_dir).with_context(|| {
            format!(
                "failed to create accounts directory at {}",
                accounts_dir.display()
            )
        })?;

        let state = read_json_or_default(&state_path)
            .with_context(|| format!("failed to read state from {}", state_path.display()))?;

        Ok(Self {
            root_dir,
            accounts_dir,
            deployments_dir,
            state_path,
            state,
        })
    }

    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn default_network(&self) -> &str {
        self.state
            .default_network
            .as_deref()
            .unwrap_or(DEFAULT_NETWORK)
    }

    fn network(&self, name: &str) -> Result<ResolvedNetwork> {
        resolve_network(&self.state.networks, name)
            .with_context(|| "add it with `set network <name> --rpc-url <url>`")
    }

    fn set_network(&mut self, name: String, network: NetworkConfig) -> Result<()> {
        self.state.networks.insert(name, network);
        self.save_state()
    }

    fn set_default_network(&mut self, name: String) -> Result<()> {
        self.state.default_network = Some(name);
        self.save_state()
    }

    fn save_state(&self) -> Result<()> {
        write_json(&self.state_path, &self.state)
            .with_context(|| format!("failed to write {}", self.state_path.display()))
    }

    fn account_path(&self, name: &str) -> PathBuf {
        self.accounts_dir.join(format!("{name}.json"))
    }

    fn save_account(&self, account: &AccountRecord) -> Result<()> {
        let path = self.account_path(&account.name);
        write_json(&path, account).with_context(|| format!("failed to write {}", path.display()))
    }

    fn load_accounts(&self) -> Result<Vec<AccountRecord>> {
        let mut accounts = Vec::new();

        for entry in fs::read_dir(&self.accounts_dir).with_context(|| {
            format!(
                "failed to read accounts directory at {}",
                self.accounts_dir.display()
            )
        })? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let account: AccountRecord = read_json_required(&path)
                .with_context(|| format!("failed to parse account file {}", path.display()))?;
            accounts.push(account);
        }

        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(accounts)
    }

    fn named_accounts(&self) -> Result<NamedAccounts> {
        let mut named = NamedAccounts::new();

        for account in self.load_accounts()? {
            let derived = named.insert_key(&account.name, &account.private_key)?;
            let stored: Address = account
                .address
                .parse()
                .with_context(|| format!("invalid stored address for `{}`", account.name))?;
            if stored != derived {
                return Err(ConfigError::AddressMismatch {
                    name: account.name,
                    stored,
                    derived,
                }
                .into());
            }
        }

        Ok(named)
    }

    fn deployment_path(&self, network: &str, contract: &str) -> PathBuf {
        self.deployments_dir
            .join(network)
            .join(format!("{contract}.json"))
    }

    fn save_deployment(&self, record: &DeploymentRecord) -> Result<PathBuf> {
        let path = self.deployment_path(&record.network, &record.contract_name);
        write_json(&path, record).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    fn load_deployments(&self) -> Result<Vec<DeploymentRecord>> {
        let mut records = Vec::new();
        if !self.deployments_dir.exists() {
            return Ok(records);
        }

        for network in fs::read_dir(&self.deployments_dir)? {
            let network = network?.path();
            if !network.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&network)? {
                let path = entry?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                let record: DeploymentRecord = read_json_required(&path)
                    .with_context(|| format!("failed to parse deployment {}", path.display()))?;
                records.push(record);
            }
        }

        records.sort_by(|a, b| (&a.network, &a.contract_name).cmp(&(&b.network, &b.contract_name)));
        Ok(records)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let mut db = Db::load(cli.data_dir)?;

    match cli.command {
        Command::Deploy(args) => handle_deploy(&db, args).await,
        Command::Set(args) => handle_set(&mut db, args),
        Command::ShowState => handle_show_state(&db),
    }
}

async fn handle_deploy(db: &Db, args: DeployArgs) -> Result<()> {
    let script = DeployScript::default();
    if !script.matches_tags(&args.tags) {
        println!(
            "No deploy script matches tags [{}]; available: [{}]",
            args.tags.join(", "),
            script.tags.join(", ")
        );
        return Ok(());
    }

    let network_name = args
        .network
        .unwrap_or_else(|| db.default_network().to_string());
    let network = db.network(&network_name)?;
    log::info!(
        "Using network {network_name} ({}), data dir {}",
        network.config.rpc_url,
        db.root_dir().display()
    );

    let accounts = db.named_accounts()?;
    let wallet = accounts
        .wallet()
        .ok_or_else(|| DeployError::AccountResolution {
            name: DEPLOYER_ACCOUNT.to_string(),
            reason: "no named accounts; run `set account deployer --private-key <key>` first"
                .to_string(),
        })?;

    let artifacts = ArtifactStore::new(&args.artifacts);
    let deployer = RpcDeployer::connect(&network.config.rpc_url, wallet, artifacts.clone())?;
    if let Some(chain_id) = network.config.chain_id {
        deployer.ensure_chain_id(chain_id).await?;
    }

    let api_url = network
        .config
        .explorer
        .as_ref()
        .map(|explorer| explorer.api_url.clone())
        .unwrap_or_default();
    let api_key = network
        .config
        .explorer
        .as_ref()
        .and(network.api_key(args.explorer_api_key));
    let verifier = ExplorerVerifier::new(&network_name, api_url, api_key, artifacts)?
        .with_chain_id(network.config.chain_id);

    let reporter = ConsoleReporter::new(std::io::stdout().is_terminal());
    let env = Environment {
        accounts: &accounts,
        deployer: &deployer,
        verifier: &verifier,
        delay: &TokioDelay,
        reporter: &reporter,
    };

    let deployment = script.run(&network.context(), &env).await?;
    record_deployment(db, &network_name, &script, &deployment);

    Ok(())
}

/// Writes the deployment record. The contract is already on chain here, so a
/// failure is only logged and never changes the exit code.
fn record_deployment(
    db: &Db,
    network: &str,
    script: &DeployScript,
    deployment: &Deployment,
) -> Option<PathBuf> {
    let saved = DeploymentRecord::new(network, script, deployment)
        .and_then(|record| db.save_deployment(&record));

    match saved {
        Ok(path) => {
            log::info!("Deployment record saved to {}", path.display());
            Some(path)
        }
        Err(err) => {
            log::warn!(
                "Deployed {} at {} but failed to save the deployment record: {err:#}",
                deployment.request.contract_name,
                deployment.result.address
            );
            None
        }
    }
}

fn handle_set(db: &mut Db, args: SetArgs) -> Result<()> {
    match args.command {
        SetCommand::Network(args) => {
            args.rpc_url
                .parse::<reqwest::Url>()
                .with_context(|| format!("invalid rpc url `{}`", args.rpc_url))?;
            if let Some(api_url) = &args.explorer_api_url {
                api_url
                    .parse::<reqwest::Url>()
                    .with_context(|| format!("invalid explorer api url `{api_url}`"))?;
            }

            let network = NetworkConfig {
                rpc_url: args.rpc_url,
                chain_id: args.chain_id,
                explorer: args.explorer_api_url.map(|api_url| ExplorerConfig {
                    api_url,
                    api_key: args.explorer_api_key,
                }),
            };
            db.set_network(args.name.clone(), network)?;
            println!("Network saved: {}", args.name);
            println!("DB root: {}", db.root_dir().display());
            Ok(())
        }
        SetCommand::DefaultNetwork { name } => {
            db.network(&name)?;
            db.set_default_network(name.clone())?;
            println!("Default network: {name}");
            println!("DB root: {}", db.root_dir().display());
            Ok(())
        }
        SetCommand::Account { name, private_key } => {
            ensure!(
                !name.is_empty()
                    && name
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'),
                "account name must be non-empty and use only [A-Za-z0-9_-]"
            );
            let signer = parse_private_key(&name, &private_key)?;
            let account = AccountRecord {
                name: name.clone(),
                address: signer.address().to_string(),
                private_key: private_key.trim().to_string(),
            };
            db.save_account(&account)?;
            println!("Account saved: {name} ({})", account.address);
            println!("DB root: {}", db.root_dir().display());
            Ok(())
        }
    }
}

fn handle_show_state(db: &Db) -> Result<()> {
    println!("DB root: {}", db.root_dir().display());
    println!("Default network: {}", db.default_network());

    let mut networks = builtin_networks();
    networks.extend(db.state.networks.clone());
    println!("Networks:");
    for (name, network) in &networks {
        let origin = if db.state.networks.contains_key(name) {
            "configured"
        } else {
            "built-in"
        };
        println!(
            "  {name}: {} (chain id {}, explorer {}) [{origin}]",
            network.rpc_url,
            network
                .chain_id
                .map_or("<any>".to_string(), |id| id.to_string()),
            network
                .explorer
                .as_ref()
                .map_or("<none>", |explorer| explorer.api_url.as_str())
        );
    }

    let accounts = db.load_accounts()?;
    if accounts.is_empty() {
        println!("Accounts: <none>");
    } else {
        println!("Accounts:");
        for account in accounts {
            println!("  {}: {}", account.name, account.address);
        }
    }

    let deployments = db.load_deployments()?;
    if deployments.is_empty() {
        println!("Deployments: <none>");
    } else {
        println!("Deployments:");
        for record in deployments {
            println!(
                "  {}/{}: {} (tx {}, verification {})",
                record.network,
                record.contract_name,
                record.address,
                record.transaction_hash,
                record.verification
            );
        }
    }

    Ok(())
}

fn format_arg(value: &DynSolValue) -> String {
    value
        .as_address()
        .map(|address| address.to_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

fn default_data_dir() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .ok_or_else(|| anyhow!("failed to detect default application files directory"))?;
    Ok(project_dirs.data_local_dir().to_path_buf())
}

fn unix_time_secs() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}

fn read_json_required<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse json from {}", path.display()))?;
    Ok(parsed)
}

fn read_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }

    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(T::default());
    }

    let parsed = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse json from {}", path.display()))?;
    Ok(parsed)
}

fn write_json<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let data = serde_json::to_string_pretty(value)
        .with_context(|| format!("failed to serialize json for {}", path.display()))?;
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
