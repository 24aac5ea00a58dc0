use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("stackforge.yaml");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_state(&self, content: &str) {
        let dir = self.root.path().join(".stackforge");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("state.json"), content).unwrap();
    }

    pub fn state_exists(&self) -> bool {
        self.root.path().join(".stackforge/state.json").exists()
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}

pub const CONFIG: &str = "project_name: demo\nregion: us-east-1\n";

pub const PARTIAL_STATE: &str = r#"{
  "project_name": "demo",
  "network": {
    "vpc_id": "vpc-0abc",
    "internet_gateway_id": "igw-0abc",
    "public_subnet_id": "subnet-0pub",
    "private_subnet_id": "subnet-0priv"
  },
  "frontend-bucket": {
    "bucket": "demo-frontend",
    "regional_domain": "demo-frontend.s3.us-east-1.amazonaws.com",
    "website_endpoint": "http://demo-frontend.s3-website-us-east-1.amazonaws.com"
  }
}"#;
