//! Reads compiled contract artifacts in the Hardhat layout:
//! `artifacts/<source>/<Name>.json`, its `<Name>.dbg.json` pointer and the
//! `build-info/<hash>.json` compiler input it refers to.

use crate::error::ArtifactError;
use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Specifier},
    json_abi::JsonAbi,
    primitives::Bytes,
};
use serde::{Deserialize, de::DeserializeOwned};
use std::{
    fs,
    path::{Path, PathBuf},
};

const BUILD_INFO_DIR: &str = "build-info";
const DBG_SUFFIX: &str = ".dbg.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    /// `<source>:<name>`, the form explorers expect for `contractname`.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// ABI-encodes constructor arguments after checking them against the
    /// constructor signature.
    pub fn encode_constructor_args(&self, args: &[DynSolValue]) -> Result<Vec<u8>, ArtifactError> {
        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(ArtifactError::ConstructorArity {
                contract: self.contract_name.clone(),
                expected: inputs.len(),
                actual: args.len(),
            });
        }

        for (index, (param, arg)) in inputs.iter().zip(args).enumerate() {
            let ty: DynSolType = param
                .resolve()
                .map_err(|_| self.type_mismatch(index, &param.ty))?;
            if !ty.matches(arg) {
                return Err(self.type_mismatch(index, &param.ty));
            }
        }

        if args.is_empty() {
            return Ok(Vec::new());
        }
        Ok(DynSolValue::Tuple(args.to_vec()).abi_encode_params())
    }

    /// Creation bytecode followed by the encoded constructor arguments.
    pub fn creation_code(&self, args: &[DynSolValue]) -> Result<Bytes, ArtifactError> {
        if self.bytecode.is_empty() {
            return Err(ArtifactError::EmptyBytecode(self.contract_name.clone()));
        }
        let encoded = self.encode_constructor_args(args)?;
        let mut code = self.bytecode.to_vec();
        code.extend_from_slice(&encoded);
        Ok(code.into())
    }

    fn type_mismatch(&self, index: usize, expected: &str) -> ArtifactError {
        ArtifactError::ConstructorType {
            contract: self.contract_name.clone(),
            index,
            expected: expected.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    /// Standard JSON compiler input.
    pub input: serde_json::Value,
}

impl BuildInfo {
    pub fn compiler_version(&self) -> String {
        format!("v{}", self.solc_long_version)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load(&self, name: &str) -> Result<Artifact, ArtifactError> {
        let path = self.find(name)?;
        log::debug!("Loading artifact {name} from {}", path.display());
        read_json(&path)
    }

    pub fn build_info(&self, name: &str) -> Result<BuildInfo, ArtifactError> {
        let artifact_path = self.find(name)?;
        let dbg_path = artifact_path.with_file_name(format!("{name}{DBG_SUFFIX}"));
        let dbg: DebugFile = read_json(&dbg_path)?;

        let parent = dbg_path.parent().unwrap_or(&self.root);
        read_json(&parent.join(dbg.build_info))
    }

    fn find(&self, name: &str) -> Result<PathBuf, ArtifactError> {
        let file_name = format!("{name}.json");
        let mut matches = Vec::new();
        collect_matches(&self.root, &file_name, &mut matches)?;

        match matches.len() {
            0 => Err(ArtifactError::NotFound {
                name: name.to_string(),
                root: self.root.clone(),
            }),
            1 => Ok(matches.remove(0)),
            _ => {
                matches.sort();
                Err(ArtifactError::Ambiguous {
                    name: name.to_string(),
                    paths: matches,
                })
            }
        }
    }
}

fn collect_matches(
    dir: &Path,
    file_name: &str,
    matches: &mut Vec<PathBuf>,
) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            if path.file_name().and_then(|name| name.to_str()) != Some(BUILD_INFO_DIR) {
                collect_matches(&path, file_name, matches)?;
            }
            continue;
        }

        if path.file_name().and_then(|name| name.to_str()) == Some(file_name) {
            matches.push(path);
        }
    }

    Ok(())
}

fn read_json<T>(path: &Path) -> Result<T, ArtifactError>
where
    T: DeserializeOwned,
{
    let data = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::address;
    use serde_json::json;
    use tempfile::TempDir;

    pub(crate) const BYTECODE: &str = "0x6080604052";

    /// Writes a minimal OufGovernanceToken artifact set into `root`.
    pub(crate) fn write_token_artifacts(root: &Path) {
        let source_dir = root.join("contracts/OufGovernanceToken.sol");
        fs::create_dir_all(&source_dir).unwrap();
        fs::create_dir_all(root.join(BUILD_INFO_DIR)).unwrap();

        let artifact = json!({
            "_format": "hh-sol-artifact-1",
            "contractName": "OufGovernanceToken",
            "sourceName": "contracts/OufGovernanceToken.sol",
            "abi": [{
                "type": "constructor",
                "stateMutability": "nonpayable",
                "inputs": [{ "name": "initialOwner", "type": "address", "internalType": "address" }]
            }],
            "bytecode": BYTECODE,
            "deployedBytecode": "0x6080",
            "linkReferences": {},
            "deployedLinkReferences": {}
        });
        fs::write(
            source_dir.join("OufGovernanceToken.json"),
            artifact.to_string(),
        )
        .unwrap();
        fs::write(
            source_dir.join("OufGovernanceToken.dbg.json"),
            json!({ "_format": "hh-sol-dbg-1", "buildInfo": "../../build-info/abc123.json" })
                .to_string(),
        )
        .unwrap();
        fs::write(
            root.join(BUILD_INFO_DIR).join("abc123.json"),
            json!({
                "_format": "hh-sol-build-info-1",
                "solcVersion": "0.8.24",
                "solcLongVersion": "0.8.24+commit.e11b9ed9",
                "input": { "language": "Solidity", "sources": {}, "settings": {} }
            })
            .to_string(),
        )
        .unwrap();
    }

    #[test]
    fn loads_artifact_from_nested_source_dir() {
        let dir = TempDir::new().unwrap();
        write_token_artifacts(dir.path());

        let artifact = ArtifactStore::new(dir.path())
            .load("OufGovernanceToken")
            .unwrap();
        assert_eq!(
            artifact.fully_qualified_name(),
            "contracts/OufGovernanceToken.sol:OufGovernanceToken"
        );
        assert_eq!(artifact.bytecode.to_string(), BYTECODE);
    }

    #[test]
    fn creation_code_appends_encoded_owner() {
        let dir = TempDir::new().unwrap();
        write_token_artifacts(dir.path());
        let artifact = ArtifactStore::new(dir.path())
            .load("OufGovernanceToken")
            .unwrap();

        let owner = address!("0x00000000000000000000000000000000000000ab");
        let code = artifact
            .creation_code(&[DynSolValue::Address(owner)])
            .unwrap();

        assert_eq!(code.len(), 5 + 32);
        assert_eq!(&code[..5], &[0x60, 0x80, 0x60, 0x40, 0x52]);
        assert_eq!(&code[5 + 12..], owner.as_slice());
    }

    #[test]
    fn rejects_wrong_constructor_arguments() {
        let dir = TempDir::new().unwrap();
        write_token_artifacts(dir.path());
        let artifact = ArtifactStore::new(dir.path())
            .load("OufGovernanceToken")
            .unwrap();

        assert!(matches!(
            artifact.creation_code(&[]),
            Err(ArtifactError::ConstructorArity {
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert!(matches!(
            artifact.creation_code(&[DynSolValue::Bool(true)]),
            Err(ArtifactError::ConstructorType { index: 0, .. })
        ));
    }

    #[test]
    fn resolves_build_info_through_dbg_file() {
        let dir = TempDir::new().unwrap();
        write_token_artifacts(dir.path());

        let info = ArtifactStore::new(dir.path())
            .build_info("OufGovernanceToken")
            .unwrap();
        assert_eq!(info.compiler_version(), "v0.8.24+commit.e11b9ed9");
        assert_eq!(info.input["language"], "Solidity");
    }

    #[test]
    fn missing_and_ambiguous_names() {
        let dir = TempDir::new().unwrap();
        write_token_artifacts(dir.path());
        let other = dir.path().join("contracts/Copy.sol");
        fs::create_dir_all(&other).unwrap();
        fs::copy(
            dir.path()
                .join("contracts/OufGovernanceToken.sol/OufGovernanceToken.json"),
            other.join("OufGovernanceToken.json"),
        )
        .unwrap();

        let store = ArtifactStore::new(dir.path());
        assert!(matches!(
            store.load("Treasury"),
            Err(ArtifactError::NotFound { .. })
        ));
        assert!(matches!(
            store.load("OufGovernanceToken"),
            Err(ArtifactError::Ambiguous { paths, .. }) if paths.len() == 2
        ));
    }
}
