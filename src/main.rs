fn main() {
    proxy_hub::run()
}
